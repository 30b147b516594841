use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::services::learning::LearningConfig;

const DEFAULT_TRANSLATION_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_ETYMOLOGY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub lexicon_path: Option<String>,
    pub pipeline: PipelineSettings,
    pub cascade: CascadeSettings,
    pub wiktionary_base_url: String,
    pub github: Option<GitHubSettings>,
    pub learning: LearningConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            host,
            port,
            log_level,
            redis_url: env_string("REDIS_URL"),
            database_url: env_string("DATABASE_URL"),
            lexicon_path: env_string("LEXICON_PATH"),
            pipeline: PipelineSettings::from_env(),
            cascade: CascadeSettings::from_env(),
            wiktionary_base_url: env_string("WIKTIONARY_BASE_URL")
                .unwrap_or_else(|| "https://en.wiktionary.org".to_string()),
            github: GitHubSettings::from_env(),
            learning: learning_defaults_from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Knobs for the resolution orchestrator and the edge cache.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cache_version: String,
    pub translation_ttl: Duration,
    pub etymology_ttl: Duration,
    pub max_text_chars: usize,
    pub max_dictionary_words: usize,
    pub max_batch_texts: usize,
}

impl PipelineSettings {
    fn from_env() -> Self {
        Self {
            cache_version: env_string("CACHE_VERSION").unwrap_or_else(|| "v1".to_string()),
            translation_ttl: Duration::from_secs(
                env_u64("TRANSLATION_CACHE_TTL_SECS").unwrap_or(DEFAULT_TRANSLATION_TTL_SECS),
            ),
            etymology_ttl: Duration::from_secs(
                env_u64("ETYMOLOGY_CACHE_TTL_SECS").unwrap_or(DEFAULT_ETYMOLOGY_TTL_SECS),
            ),
            max_text_chars: env_u64("MAX_TEXT_CHARS").map(|v| v as usize).unwrap_or(5000),
            max_dictionary_words: 10,
            max_batch_texts: 50,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cache_version: "v1".to_string(),
            translation_ttl: Duration::from_secs(DEFAULT_TRANSLATION_TTL_SECS),
            etymology_ttl: Duration::from_secs(DEFAULT_ETYMOLOGY_TTL_SECS),
            max_text_chars: 5000,
            max_dictionary_words: 10,
            max_batch_texts: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CascadeSettings {
    pub fast_model: String,
    pub fallback_model: String,
    pub attempt_timeout: Duration,
}

impl CascadeSettings {
    fn from_env() -> Self {
        Self {
            fast_model: env_string("LLM_FAST_MODEL")
                .or_else(|| env_string("LLM_MODEL"))
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            fallback_model: env_string("LLM_FALLBACK_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            attempt_timeout: Duration::from_millis(
                env_u64("LLM_ATTEMPT_TIMEOUT_MS").unwrap_or(20_000),
            ),
        }
    }
}

/// Where learned words are proposed upstream. Absent when no token is set.
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub token: String,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
    pub lexicon_path: String,
    pub marker: String,
    pub branch_prefix: String,
}

impl GitHubSettings {
    fn from_env() -> Option<Self> {
        let token = env_string("GITHUB_TOKEN")?;
        let owner = env_string("GITHUB_OWNER")?;
        let repo = env_string("GITHUB_REPO")?;

        Some(Self {
            token,
            api_base: env_string("GITHUB_API_BASE")
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            owner,
            repo,
            base_branch: env_string("GITHUB_BASE_BRANCH").unwrap_or_else(|| "main".to_string()),
            lexicon_path: env_string("GITHUB_LEXICON_PATH")
                .unwrap_or_else(|| "data/lexicon.jsonl".to_string()),
            marker: env_string("GITHUB_LEXICON_MARKER")
                .unwrap_or_else(|| crate::lexicon::INSERT_MARKER.to_string()),
            branch_prefix: env_string("GITHUB_BRANCH_PREFIX")
                .unwrap_or_else(|| "learned-words".to_string()),
        })
    }
}

fn learning_defaults_from_env() -> LearningConfig {
    let defaults = LearningConfig::default();
    LearningConfig {
        pr_threshold: env_u64("LEARNING_PR_THRESHOLD")
            .map(|v| v as usize)
            .unwrap_or(defaults.pr_threshold),
        max_bulk_size: env_u64("LEARNING_MAX_BULK_SIZE")
            .map(|v| v as usize)
            .unwrap_or(defaults.max_bulk_size),
        max_words_per_pr: env_u64("LEARNING_MAX_WORDS_PER_PR")
            .map(|v| v as usize)
            .unwrap_or(defaults.max_words_per_pr),
        auto_trigger: env_bool("LEARNING_AUTO_TRIGGER").unwrap_or(defaults.auto_trigger),
        min_confidence: env_string("LEARNING_MIN_CONFIDENCE")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults.min_confidence),
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| v == "true" || v == "1")
}
