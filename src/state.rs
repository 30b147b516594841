use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{EdgeCache, KvStore, MemoryCache, RedisCache};
use crate::config::{CascadeSettings, Config, PipelineSettings};
use crate::db::{DictionaryRepository, MemoryDictionary, PgDictionary};
use crate::lexicon::{LexiconError, LexiconStore};
use crate::services::ai_cascade::AiCascade;
use crate::services::contribution::{ContributionTarget, ContributionTrigger};
use crate::services::etymology::EtymologyService;
use crate::services::github::{GitHubClient, VcsHost};
use crate::services::learning::{LearningConfig, LearningService};
use crate::services::llm_provider::{InferenceBackend, LLMProvider};
use crate::services::translation::TranslationService;
use crate::services::wiktionary::{ExternalLexicon, WiktionaryClient};
use crate::store::{LedgerStore, MemoryLedgerStore, RedisLedgerStore};

const LEDGER_KEY_PREFIX: &str = "lexis:learning";
const WIKTIONARY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to load lexicon: {0}")]
    Lexicon(#[from] LexiconError),
}

/// Every backend the services are wired from. Production builds it from
/// [`Config`]; tests substitute in-memory stores and mocks.
pub struct StateComponents {
    pub lexicon: Arc<LexiconStore>,
    pub kv: Arc<dyn KvStore>,
    pub dictionary: Arc<dyn DictionaryRepository>,
    pub ledger: Arc<dyn LedgerStore>,
    pub inference: Arc<dyn InferenceBackend>,
    pub external: Arc<dyn ExternalLexicon>,
    pub vcs: Option<Arc<dyn VcsHost>>,
    pub target: Option<ContributionTarget>,
    pub pipeline: PipelineSettings,
    pub cascade: CascadeSettings,
    pub learning: LearningConfig,
    pub redis: Option<RedisCache>,
}

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    lexicon: Arc<LexiconStore>,
    dictionary: Arc<dyn DictionaryRepository>,
    redis: Option<RedisCache>,
    cascade: Arc<AiCascade>,
    translation: Arc<TranslationService>,
    etymology: Arc<EtymologyService>,
    learning: Arc<LearningService>,
    trigger: Arc<ContributionTrigger>,
}

impl AppState {
    pub fn from_components(c: StateComponents) -> Self {
        let cache = EdgeCache::new(c.kv, c.pipeline.cache_version.clone());
        let cascade = Arc::new(AiCascade::from_settings(c.inference, &c.cascade));
        let learning = Arc::new(LearningService::new(c.ledger, c.learning));
        let trigger = Arc::new(ContributionTrigger::new(Arc::clone(&learning), c.vcs, c.target));

        let translation = Arc::new(TranslationService::new(
            Arc::clone(&c.lexicon),
            Arc::clone(&c.dictionary),
            cache.clone(),
            Arc::clone(&cascade),
            Arc::clone(&learning),
            Arc::clone(&trigger),
            c.pipeline.clone(),
        ));
        let etymology = Arc::new(EtymologyService::new(
            Arc::clone(&c.lexicon),
            cache,
            c.external,
            Arc::clone(&cascade),
            c.pipeline,
        ));

        Self {
            started_at: Instant::now(),
            lexicon: c.lexicon,
            dictionary: c.dictionary,
            redis: c.redis,
            cascade,
            translation,
            etymology,
            learning,
            trigger,
        }
    }

    /// Missing or unreachable Redis/Postgres degrade to in-process stores.
    pub async fn from_config(config: &Config) -> Result<Self, StateError> {
        let lexicon = match &config.lexicon_path {
            Some(path) => LexiconStore::load_path(path)?,
            None => LexiconStore::embedded()?,
        };
        info!(words = lexicon.len(), "lexicon loaded");

        let redis = match &config.redis_url {
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => Some(cache),
                Err(err) => {
                    warn!(error = %err, "redis unavailable, using in-memory cache and ledger");
                    None
                }
            },
            None => None,
        };
        let (kv, ledger): (Arc<dyn KvStore>, Arc<dyn LedgerStore>) = match &redis {
            Some(cache) => (
                Arc::new(cache.clone()),
                Arc::new(RedisLedgerStore::new(cache.connection(), LEDGER_KEY_PREFIX)),
            ),
            None => (Arc::new(MemoryCache::new()), Arc::new(MemoryLedgerStore::new())),
        };

        let dictionary: Arc<dyn DictionaryRepository> = match &config.database_url {
            Some(url) => match PgDictionary::connect(url).await {
                Ok(repo) => Arc::new(repo),
                Err(err) => {
                    warn!(error = %err, "database unavailable, relational tier is empty");
                    Arc::new(MemoryDictionary::new())
                }
            },
            None => Arc::new(MemoryDictionary::new()),
        };

        let vcs: Option<Arc<dyn VcsHost>> = config
            .github
            .as_ref()
            .map(|gh| Arc::new(GitHubClient::new(gh)) as Arc<dyn VcsHost>);
        if vcs.is_none() {
            info!("GITHUB_TOKEN/GITHUB_OWNER/GITHUB_REPO not set, contributions disabled");
        }

        Ok(Self::from_components(StateComponents {
            lexicon: Arc::new(lexicon),
            kv,
            dictionary,
            ledger,
            inference: Arc::new(LLMProvider::from_env()),
            external: Arc::new(WiktionaryClient::new(&config.wiktionary_base_url, WIKTIONARY_TIMEOUT)),
            vcs,
            target: config.github.as_ref().map(ContributionTarget::from),
            pipeline: config.pipeline.clone(),
            cascade: config.cascade.clone(),
            learning: config.learning.clone(),
            redis,
        }))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn lexicon(&self) -> Arc<LexiconStore> {
        Arc::clone(&self.lexicon)
    }

    pub fn dictionary(&self) -> Arc<dyn DictionaryRepository> {
        Arc::clone(&self.dictionary)
    }

    pub fn redis(&self) -> Option<&RedisCache> {
        self.redis.as_ref()
    }

    pub fn ai_available(&self) -> bool {
        self.cascade.is_available()
    }

    pub fn translation(&self) -> Arc<TranslationService> {
        Arc::clone(&self.translation)
    }

    pub fn etymology(&self) -> Arc<EtymologyService> {
        Arc::clone(&self.etymology)
    }

    pub fn learning(&self) -> Arc<LearningService> {
        Arc::clone(&self.learning)
    }

    pub fn trigger(&self) -> Arc<ContributionTrigger> {
        Arc::clone(&self.trigger)
    }
}
