//! Proposes pending learned words upstream as a pull request against the
//! canonical lexicon source, guarded so only one contribution runs at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GitHubSettings;
use crate::lexicon::{is_comment_or_blank, normalize_word, DictionaryEntry, LexiconLine};
use crate::services::github::{PullRequest, PullRequestDraft, VcsError, VcsHost};
use crate::services::learning::{LearnedWord, LearningError, LearningService};
use crate::store::{LedgerStore, StoreError};

/// Upper bound on how long a crashed holder keeps the processing guard.
pub const GUARD_TTL: Duration = Duration::from_secs(15 * 60);
const SAMPLE_TRANSLATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionTarget {
    pub base_branch: String,
    pub lexicon_path: String,
    pub marker: String,
    pub branch_prefix: String,
}

impl From<&GitHubSettings> for ContributionTarget {
    fn from(settings: &GitHubSettings) -> Self {
        Self {
            base_branch: settings.base_branch.clone(),
            lexicon_path: settings.lexicon_path.clone(),
            marker: settings.marker.clone(),
            branch_prefix: settings.branch_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<String>,
}

impl ContributionResult {
    fn failed(error: &ContributionError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ContributionError {
    #[error("a contribution is already in progress")]
    InProgress,
    #[error("contribution target is not configured")]
    NotConfigured,
    #[error("no pending words are eligible for contribution")]
    NoEligibleWords,
    #[error("all {} eligible words are already in the lexicon", .0.len())]
    AlreadyInLexicon(Vec<String>),
    #[error("lexicon source has no insertion marker")]
    MarkerMissing,
    #[error("failed to encode lexicon entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Learning(#[from] LearningError),
    #[error("ledger store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Words whose entries landed in the pull request, plus words the source
/// already had.
#[derive(Debug, Clone)]
struct Submission {
    pull_request: PullRequest,
    added: Vec<String>,
    already_present: Vec<String>,
}

/// Branch, commit and pull request for `words`. Does not touch the ledger.
pub async fn create_dictionary_pr(
    host: &dyn VcsHost,
    target: &ContributionTarget,
    words: &[LearnedWord],
) -> ContributionResult {
    match submit(host, target, words).await {
        Ok(submission) => ContributionResult {
            success: true,
            pr_number: Some(submission.pull_request.number),
            pr_url: Some(submission.pull_request.html_url),
            error: None,
            words: submission.added,
        },
        Err(err) => ContributionResult::failed(&err),
    }
}

async fn submit(
    host: &dyn VcsHost,
    target: &ContributionTarget,
    words: &[LearnedWord],
) -> Result<Submission, ContributionError> {
    if words.is_empty() {
        return Err(ContributionError::NoEligibleWords);
    }

    let base_sha = host.get_ref_sha(&target.base_branch).await?;
    let file = host.get_file(&target.lexicon_path, &target.base_branch).await?;
    let splice = splice_entries(&file.content, &target.marker, words)?;
    if splice.added.is_empty() {
        return Err(ContributionError::AlreadyInLexicon(splice.already_present));
    }

    let branch = branch_name(&target.branch_prefix, Utc::now());
    host.create_branch(&branch, &base_sha).await?;
    host.update_file(
        &target.lexicon_path,
        &branch,
        &splice.content,
        &file.sha,
        &commit_message(&splice.added),
    )
    .await?;

    let added: HashSet<&str> = splice.added.iter().map(String::as_str).collect();
    let contributed: Vec<&LearnedWord> = words
        .iter()
        .filter(|w| added.contains(w.word.as_str()))
        .collect();
    let pull_request = host
        .open_pull_request(&PullRequestDraft {
            title: format!("Add {} learned words to the lexicon", splice.added.len()),
            body: pull_request_body(&contributed),
            head: branch,
            base: target.base_branch.clone(),
        })
        .await?;

    Ok(Submission {
        pull_request,
        added: splice.added,
        already_present: splice.already_present,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pub content: String,
    pub added: Vec<String>,
    pub already_present: Vec<String>,
}

/// Inserts one JSONL line per word above the marker line. Words already in
/// the source (or repeated in `words`) are not inserted twice.
pub fn splice_entries(
    source: &str,
    marker: &str,
    words: &[LearnedWord],
) -> Result<Splice, ContributionError> {
    let marker = marker.trim();
    if !source.lines().any(|l| l.trim() == marker) {
        return Err(ContributionError::MarkerMissing);
    }

    let mut known: HashSet<String> = source
        .lines()
        .filter(|l| !is_comment_or_blank(l))
        .filter_map(|l| serde_json::from_str::<LexiconLine>(l.trim()).ok())
        .map(|l| normalize_word(&l.word))
        .collect();

    let mut inserted = String::new();
    let mut added = Vec::new();
    let mut already_present = Vec::new();
    for word in words {
        let key = normalize_word(&word.word);
        if !known.insert(key.clone()) {
            already_present.push(key);
            continue;
        }
        let line = LexiconLine {
            word: key.clone(),
            entry: DictionaryEntry {
                translations: word.translations.clone(),
                pos: word.detected_pos.clone(),
                ..DictionaryEntry::default()
            },
        };
        inserted.push_str(&serde_json::to_string(&line)?);
        inserted.push('\n');
        added.push(key);
    }

    let mut content = String::with_capacity(source.len() + inserted.len());
    let mut spliced = false;
    for line in source.split_inclusive('\n') {
        if !spliced && line.trim() == marker {
            content.push_str(&inserted);
            spliced = true;
        }
        content.push_str(line);
    }

    Ok(Splice { content, added, already_present })
}

pub fn branch_name(prefix: &str, now: DateTime<Utc>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{}-{}", prefix.trim_end_matches('/'), now.format("%Y%m%d%H%M%S"), &id[..8])
}

fn commit_message(added: &[String]) -> String {
    let mut message = format!("Add {} learned words\n\n", added.len());
    for word in added {
        message.push_str("- ");
        message.push_str(word);
        message.push('\n');
    }
    message
}

fn pull_request_body(words: &[&LearnedWord]) -> String {
    let mut body = String::from(
        "Words learned from AI-resolved translations and bulk uploads.\n\n\
         | Word | POS | Translations | Seen | Confidence |\n\
         |------|-----|--------------|------|------------|\n",
    );
    for word in words {
        let sample = word
            .translations
            .iter()
            .take(SAMPLE_TRANSLATIONS)
            .map(|(lang, value)| format!("{lang}: {}", escape_cell(value)))
            .collect::<Vec<_>>()
            .join(", ");
        body.push_str(&format!(
            "| {} | {} | {} | {} | {:.2} |\n",
            escape_cell(&word.word),
            word.detected_pos.as_deref().map(escape_cell).unwrap_or_else(|| "-".into()),
            sample,
            word.seen_count,
            word.confidence
        ));
    }
    body
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

/// Held processing guard. Dropping it unreleased (the run future was
/// cancelled) releases the guard from a spawned task.
struct ProcessingLease {
    store: Option<Arc<dyn LedgerStore>>,
}

impl ProcessingLease {
    async fn release(mut self) {
        if let Some(store) = self.store.take() {
            release_guard(store).await;
        }
    }
}

impl Drop for ProcessingLease {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_guard(store));
            }
            Err(_) => warn!("contribution cancelled outside a runtime, guard left to expire"),
        }
    }
}

async fn release_guard(store: Arc<dyn LedgerStore>) {
    if let Err(err) = store.release_processing().await {
        warn!(error = %err, "failed to release contribution guard");
    }
}

/// Ledger-side half of the workflow: guard, eligibility, queue bookkeeping.
pub struct ContributionTrigger {
    learning: Arc<LearningService>,
    host: Option<Arc<dyn VcsHost>>,
    target: Option<ContributionTarget>,
    guard_ttl: Duration,
}

impl ContributionTrigger {
    pub fn new(
        learning: Arc<LearningService>,
        host: Option<Arc<dyn VcsHost>>,
        target: Option<ContributionTarget>,
    ) -> Self {
        Self { learning, host, target, guard_ttl: GUARD_TTL }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.target.is_some()
    }

    /// Fire-and-forget run; the outcome is only logged.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let trigger = Arc::clone(self);
        tokio::spawn(async move {
            match trigger.run().await {
                Ok(result) => info!(pr_number = ?result.pr_number, words = result.words.len(), "contribution opened"),
                Err(ContributionError::InProgress) => {}
                Err(err) => warn!(error = %err, "background contribution failed"),
            }
        })
    }

    /// Acquires the guard, contributes eligible pending words, and releases
    /// the guard on every path.
    pub async fn run(&self) -> Result<ContributionResult, ContributionError> {
        let (Some(host), Some(target)) = (self.host.as_deref(), self.target.as_ref()) else {
            return Err(ContributionError::NotConfigured);
        };

        let store = self.learning.store();
        if !store.try_acquire_processing(self.guard_ttl).await? {
            return Err(ContributionError::InProgress);
        }
        let lease = ProcessingLease { store: Some(store) };

        let outcome = self.contribute(host, target).await;

        lease.release().await;
        outcome
    }

    async fn contribute(
        &self,
        host: &dyn VcsHost,
        target: &ContributionTarget,
    ) -> Result<ContributionResult, ContributionError> {
        let config = self.learning.config().await;
        let eligible: Vec<LearnedWord> = self
            .learning
            .pending_words()
            .await?
            .into_iter()
            .filter(|w| w.qualifies(config.min_confidence))
            .take(config.max_words_per_pr)
            .collect();

        let submission = match submit(host, target, &eligible).await {
            Ok(submission) => submission,
            Err(ContributionError::AlreadyInLexicon(words)) => {
                self.prune(&words).await;
                return Err(ContributionError::AlreadyInLexicon(words));
            }
            Err(err) => return Err(err),
        };

        let mut done = submission.added.clone();
        done.extend(submission.already_present.iter().cloned());
        self.prune(&done).await;
        if let Err(err) = self
            .learning
            .store()
            .record_sync(Utc::now(), submission.pull_request.number)
            .await
        {
            warn!(error = %err, "failed to record contribution sync");
        }

        info!(
            pr_number = submission.pull_request.number,
            added = submission.added.len(),
            "learned words contributed"
        );

        Ok(ContributionResult {
            success: true,
            pr_number: Some(submission.pull_request.number),
            pr_url: Some(submission.pull_request.html_url),
            error: None,
            words: submission.added,
        })
    }

    /// Drops contributed (or already canonical) words from the pending queue.
    async fn prune(&self, words: &[String]) {
        let store = self.learning.store();
        if let Err(err) = store.remove_pending(words).await {
            warn!(error = %err, "pending queue not pruned");
            return;
        }
        match store.pending_len().await {
            Ok(pending) => {
                if let Err(err) = store.record_pending_count(pending).await {
                    warn!(error = %err, "failed to record pending count");
                }
            }
            Err(err) => warn!(error = %err, "pending queue unreadable after pruning"),
        }
    }
}
