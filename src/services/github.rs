//! Version-control host used by the contribution workflow. Error values carry
//! the failing operation and HTTP status only, never tokens or response bodies.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GitHubSettings;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("lexis-backend/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("{operation} request failed")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned HTTP {status}")]
    HttpStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{operation} returned an unreadable payload")]
    Decode { operation: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepoFile {
    pub content: String,
    /// Blob sha, required to update the file.
    pub sha: String,
}

#[derive(Debug, Clone)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[async_trait]
pub trait VcsHost: Send + Sync {
    async fn get_ref_sha(&self, branch: &str) -> Result<String, VcsError>;
    async fn create_branch(&self, branch: &str, from_sha: &str) -> Result<(), VcsError>;
    async fn get_file(&self, path: &str, branch: &str) -> Result<RepoFile, VcsError>;
    async fn update_file(
        &self,
        path: &str,
        branch: &str,
        content: &str,
        sha: &str,
        message: &str,
    ) -> Result<(), VcsError>;
    async fn open_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest, VcsError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    repo_url: String,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
    sha: String,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token: settings.token.clone(),
            repo_url: format!(
                "{}/repos/{}/{}",
                settings.api_base.trim_end_matches('/'),
                settings.owner,
                settings.repo
            ),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.repo_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, VcsError> {
        let resp = builder.send().await.map_err(|source| VcsError::Request {
            operation,
            source: source.without_url(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(operation, %status, "GitHub request rejected");
            return Err(VcsError::HttpStatus { operation, status });
        }
        Ok(resp)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, VcsError> {
        self.send(operation, builder)
            .await?
            .json()
            .await
            .map_err(|_| VcsError::Decode { operation })
    }
}

#[async_trait]
impl VcsHost for GitHubClient {
    async fn get_ref_sha(&self, branch: &str) -> Result<String, VcsError> {
        let builder = self.request(reqwest::Method::GET, &format!("git/ref/heads/{branch}"));
        let resp: RefResponse = self.send_json("get ref", builder).await?;
        Ok(resp.object.sha)
    }

    async fn create_branch(&self, branch: &str, from_sha: &str) -> Result<(), VcsError> {
        let builder = self.request(reqwest::Method::POST, "git/refs").json(&serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": from_sha,
        }));
        self.send("create branch", builder).await?;
        Ok(())
    }

    async fn get_file(&self, path: &str, branch: &str) -> Result<RepoFile, VcsError> {
        const OPERATION: &str = "get file";
        let builder = self
            .request(reqwest::Method::GET, &format!("contents/{path}"))
            .query(&[("ref", branch)]);
        let resp: ContentResponse = self.send_json(OPERATION, builder).await?;
        Ok(RepoFile {
            content: decode_content(&resp.content).ok_or(VcsError::Decode { operation: OPERATION })?,
            sha: resp.sha,
        })
    }

    async fn update_file(
        &self,
        path: &str,
        branch: &str,
        content: &str,
        sha: &str,
        message: &str,
    ) -> Result<(), VcsError> {
        let builder = self
            .request(reqwest::Method::PUT, &format!("contents/{path}"))
            .json(&serde_json::json!({
                "message": message,
                "content": BASE64.encode(content.as_bytes()),
                "sha": sha,
                "branch": branch,
            }));
        self.send("update file", builder).await?;
        Ok(())
    }

    async fn open_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest, VcsError> {
        let builder = self.request(reqwest::Method::POST, "pulls").json(&serde_json::json!({
            "title": draft.title,
            "body": draft.body,
            "head": draft.head,
            "base": draft.base,
        }));
        self.send_json("open pull request", builder).await
    }
}

/// The contents API returns base64 wrapped at 60 columns.
fn decode_content(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact).ok()?;
    String::from_utf8(bytes).ok()
}
