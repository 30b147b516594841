//! Learned word ledger: words the pipeline could only resolve through the AI
//! cascade (or that were imported in bulk), merged across observations and
//! queued for contribution to the canonical lexicon.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lexicon::normalize_word;
use crate::store::{LedgerStore, StoreError};

pub const DEFAULT_AI_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_BULK_CONFIDENCE: f64 = 0.9;
pub const MIN_WORD_CHARS: usize = 2;
pub const MAX_WORD_CHARS: usize = 50;
pub const CONTEXT_WINDOW: usize = 5;
/// Repeated sightings that qualify a word regardless of confidence.
pub const REPEAT_QUALIFICATION: u32 = 3;
const BULK_SUB_BATCH: usize = 50;
const MAX_CONTEXT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnedSource {
    #[default]
    Ai,
    Bulk,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedWord {
    pub word: String,
    pub source_language: String,
    pub translations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_pos: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub seen_count: u32,
    pub last_seen: DateTime<Utc>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    pub source: LearnedSource,
}

/// One sighting of a word, as fed into the ledger.
#[derive(Debug, Clone)]
pub struct Observation {
    pub translations: BTreeMap<String, String>,
    pub confidence: f64,
    pub pos: Option<String>,
    pub context: Option<String>,
}

impl LearnedWord {
    pub fn new(
        word: String,
        source_language: String,
        observation: Observation,
        source: LearnedSource,
        now: DateTime<Utc>,
    ) -> Self {
        let mut contexts = Vec::new();
        if let Some(ctx) = observation.context {
            push_context(&mut contexts, ctx);
        }
        Self {
            word,
            source_language,
            translations: observation.translations,
            detected_pos: observation.pos,
            first_seen: now,
            seen_count: 1,
            last_seen: now,
            confidence: observation.confidence,
            contexts,
            source,
        }
    }

    /// Repeat sighting: later translations overwrite per language, the count
    /// grows, and confidence moves halfway towards the incoming value.
    pub fn absorb(&mut self, observation: Observation, now: DateTime<Utc>) {
        self.translations.extend(observation.translations);
        self.seen_count = self.seen_count.saturating_add(1);
        self.last_seen = now;
        self.confidence = merge_confidence(self.confidence, observation.confidence);
        if observation.pos.is_some() {
            self.detected_pos = observation.pos;
        }
        if let Some(ctx) = observation.context {
            push_context(&mut self.contexts, ctx);
        }
    }

    /// Either bar alone is enough.
    pub fn qualifies(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence || self.seen_count >= REPEAT_QUALIFICATION
    }
}

pub fn merge_confidence(existing: f64, incoming: f64) -> f64 {
    ((existing + incoming) / 2.0).clamp(0.0, 1.0)
}

/// `None` for NaN/infinite input; everything else is clamped into [0, 1].
pub fn clamp_confidence(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

fn push_context(contexts: &mut Vec<String>, context: String) {
    let context: String = context.trim().chars().take(MAX_CONTEXT_CHARS).collect();
    if context.is_empty() {
        return;
    }
    contexts.push(context);
    if contexts.len() > CONTEXT_WINDOW {
        let overflow = contexts.len() - CONTEXT_WINDOW;
        contexts.drain(..overflow);
    }
}

pub fn is_valid_word_length(word: &str) -> bool {
    let len = word.chars().count();
    (MIN_WORD_CHARS..=MAX_WORD_CHARS).contains(&len)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(rename = "prThreshold")]
    pub pr_threshold: usize,
    #[serde(rename = "maxBulkSize")]
    pub max_bulk_size: usize,
    #[serde(rename = "maxWordsPerPR")]
    pub max_words_per_pr: usize,
    #[serde(rename = "autoTrigger")]
    pub auto_trigger: bool,
    #[serde(rename = "minConfidence")]
    pub min_confidence: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            pr_threshold: 10,
            max_bulk_size: 1000,
            max_words_per_pr: 500,
            auto_trigger: true,
            min_confidence: 0.7,
        }
    }
}

impl LearningConfig {
    pub fn should_trigger_pr(&self, pending_count: usize, is_processing: bool) -> bool {
        self.auto_trigger && pending_count >= self.pr_threshold && !is_processing
    }

    pub fn validate(&self) -> Result<(), LearningError> {
        if self.pr_threshold == 0 {
            return Err(LearningError::Validation("prThreshold must be at least 1".into()));
        }
        if self.max_bulk_size == 0 || self.max_words_per_pr == 0 {
            return Err(LearningError::Validation(
                "maxBulkSize and maxWordsPerPR must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(LearningError::Validation(
                "minConfidence must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub total_learned: u64,
    pub pending_count: usize,
    pub last_sync_to_repo: Option<DateTime<Utc>>,
    #[serde(rename = "lastPRNumber")]
    pub last_pr_number: Option<u64>,
    pub is_processing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOptions {
    pub source_language: Option<String>,
    pub confidence: Option<f64>,
    pub pos: Option<String>,
    pub context: Option<String>,
    pub source: Option<LearnedSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreOutcome {
    pub stored: bool,
    #[serde(rename = "shouldTriggerPR")]
    pub should_trigger_pr: bool,
    #[serde(rename = "pendingCount")]
    pub pending_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkTier {
    Small,
    #[default]
    Medium,
    Large,
    Unlimited,
}

impl BulkTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Unlimited => "unlimited",
        }
    }

    /// `None` means no cap.
    pub fn cap(&self, config: &LearningConfig) -> Option<usize> {
        match self {
            Self::Small => Some(100),
            Self::Medium => Some(500),
            Self::Large => Some(config.max_bulk_size),
            Self::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWord {
    pub word: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOptions {
    #[serde(default)]
    pub tier: BulkTier,
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkUploadResult {
    pub success: bool,
    /// The whole batch was refused before any item was applied.
    #[serde(skip)]
    pub rejected: bool,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    #[serde(rename = "pendingCount")]
    pub pending_count: usize,
    #[serde(rename = "shouldTriggerPR")]
    pub should_trigger_pr: bool,
}

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("{0}")]
    Validation(String),
    #[error("ledger store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Created,
    Merged,
}

pub struct LearningService {
    store: Arc<dyn LedgerStore>,
    defaults: LearningConfig,
}

impl LearningService {
    pub fn new(store: Arc<dyn LedgerStore>, defaults: LearningConfig) -> Self {
        Self { store, defaults }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.store)
    }

    /// Stored config, or the env-derived defaults when none is stored or the
    /// store cannot be read.
    pub async fn config(&self) -> LearningConfig {
        match self.store.load_config().await {
            Ok(Some(config)) => config,
            Ok(None) => self.defaults.clone(),
            Err(err) => {
                warn!(error = %err, "learning config unreadable, using defaults");
                self.defaults.clone()
            }
        }
    }

    pub async fn update_config(&self, config: LearningConfig) -> Result<LearningConfig, LearningError> {
        config.validate()?;
        self.store.save_config(&config).await?;
        Ok(config)
    }

    pub async fn store_learned_word(
        &self,
        word: &str,
        translations: BTreeMap<String, String>,
        opts: StoreOptions,
    ) -> Result<StoreOutcome, LearningError> {
        let key = normalize_word(word);
        if key.is_empty() {
            return Err(LearningError::Validation("word is required".into()));
        }
        if !is_valid_word_length(&key) {
            return Err(LearningError::Validation(format!(
                "word must be between {MIN_WORD_CHARS} and {MAX_WORD_CHARS} characters"
            )));
        }
        let translations = clean_translations(translations);
        if translations.is_empty() {
            return Err(LearningError::Validation(
                "at least one translation is required".into(),
            ));
        }
        let confidence = match opts.confidence {
            Some(value) => clamp_confidence(value).ok_or_else(|| {
                LearningError::Validation("confidence must be a finite number".into())
            })?,
            None => DEFAULT_AI_CONFIDENCE,
        };

        let config = self.config().await;
        let observation = Observation {
            translations,
            confidence,
            pos: opts.pos.filter(|p| !p.trim().is_empty()),
            context: opts.context,
        };
        let source_language = normalize_language(opts.source_language.as_deref());
        let source = opts.source.unwrap_or_default();

        let kind = self.upsert(&key, &source_language, observation, source).await?;
        let pending_count = self.store.pending_len().await?;
        self.note_pending_count(pending_count).await;

        debug!(word = %key, ?kind, pending_count, "learned word stored");

        Ok(StoreOutcome {
            stored: true,
            should_trigger_pr: self.should_trigger(&config, pending_count).await,
            pending_count,
        })
    }

    pub async fn bulk_upload_words(&self, words: Vec<BulkWord>, opts: BulkOptions) -> BulkUploadResult {
        let config = self.config().await;

        if let Some(cap) = opts.tier.cap(&config) {
            if words.len() > cap {
                return BulkUploadResult {
                    success: false,
                    rejected: true,
                    errors: vec![format!(
                        "batch of {} words exceeds the {} tier limit of {}; nothing was changed",
                        words.len(),
                        opts.tier.as_str(),
                        cap
                    )],
                    pending_count: self.store.pending_len().await.unwrap_or(0),
                    ..BulkUploadResult::default()
                };
            }
        }

        let source_language = normalize_language(opts.source_language.as_deref());
        let mut result = BulkUploadResult::default();

        // Concurrent upserts of the same key would lose updates, so repeated
        // words are grouped and applied in order within one task.
        let mut order: Vec<String> = Vec::new();
        let mut items: HashMap<String, Vec<BulkWord>> = HashMap::new();
        for item in words {
            let key = normalize_word(&item.word);
            if !is_valid_word_length(&key) {
                result.skipped += 1;
                continue;
            }
            match items.entry(key) {
                Entry::Occupied(mut slot) => slot.get_mut().push(item),
                Entry::Vacant(slot) => {
                    order.push(slot.key().clone());
                    slot.insert(vec![item]);
                }
            }
        }

        for chunk in order.chunks(BULK_SUB_BATCH) {
            let tasks = chunk.iter().filter_map(|key| {
                let group = items.remove(key)?;
                let source_language = source_language.clone();
                Some(async move {
                    let mut outcomes = Vec::with_capacity(group.len());
                    for item in group {
                        outcomes.push(self.bulk_item(key, item, &source_language).await);
                    }
                    (key.clone(), outcomes)
                })
            });

            for (key, outcomes) in join_all(tasks).await {
                for outcome in outcomes {
                    match outcome {
                        Ok(Upsert::Created) => result.added += 1,
                        Ok(Upsert::Merged) => result.updated += 1,
                        Err(message) => result.errors.push(format!("{key}: {message}")),
                    }
                }
            }
        }

        match self.store.pending_len().await {
            Ok(pending) => {
                result.pending_count = pending;
                self.note_pending_count(pending).await;
            }
            Err(err) => result.errors.push(format!("pending queue unavailable: {err}")),
        }

        result.success =
            result.errors.is_empty() || result.added > 0 || result.updated > 0;
        result.should_trigger_pr = self.should_trigger(&config, result.pending_count).await;
        result
    }

    async fn bulk_item(&self, key: &str, item: BulkWord, source_language: &str) -> Result<Upsert, String> {
        let translations = clean_translations(item.translations);
        if translations.is_empty() {
            return Err("no translations".to_string());
        }
        let confidence = item
            .confidence
            .and_then(clamp_confidence)
            .unwrap_or(DEFAULT_BULK_CONFIDENCE);
        let observation = Observation {
            translations,
            confidence,
            pos: item.pos,
            context: item.context,
        };
        self.upsert(key, source_language, observation, LearnedSource::Bulk)
            .await
            .map_err(|err| err.to_string())
    }

    pub async fn get_learned_translation(&self, word: &str, lang: &str) -> Result<Option<String>, LearningError> {
        let key = normalize_word(word);
        if key.is_empty() {
            return Ok(None);
        }
        let Some(record) = self.store.load_word(&key).await? else {
            return Ok(None);
        };
        let config = self.config().await;
        if !record.qualifies(config.min_confidence) {
            return Ok(None);
        }
        Ok(record.translations.get(&normalize_word(lang)).cloned())
    }

    pub async fn get_learned_word(&self, word: &str) -> Result<Option<LearnedWord>, LearningError> {
        Ok(self.store.load_word(&normalize_word(word)).await?)
    }

    pub async fn pending_words(&self) -> Result<Vec<LearnedWord>, LearningError> {
        let keys = self.store.pending().await?;
        Ok(self.store.load_words(&keys).await?)
    }

    pub async fn stats(&self) -> Result<LearningStats, LearningError> {
        let record = self.store.load_stats().await?;
        let pending_count = self.store.pending_len().await?;
        let is_processing = self.store.is_processing().await?;
        Ok(LearningStats {
            total_learned: record.total_learned,
            pending_count,
            last_sync_to_repo: record.last_sync_to_repo,
            last_pr_number: record.last_pr_number,
            is_processing,
        })
    }

    /// Read-modify-write against the store; concurrent sightings of the same
    /// word may lose one increment.
    async fn upsert(
        &self,
        key: &str,
        source_language: &str,
        observation: Observation,
        source: LearnedSource,
    ) -> Result<Upsert, StoreError> {
        let now = Utc::now();
        if let Some(mut record) = self.store.load_word(key).await? {
            record.absorb(observation, now);
            self.store.save_word(&record).await?;
            return Ok(Upsert::Merged);
        }

        let record = LearnedWord::new(
            key.to_string(),
            source_language.to_string(),
            observation,
            source,
            now,
        );
        self.store.save_word(&record).await?;
        self.store.enqueue_pending(key).await?;
        if let Err(err) = self.store.bump_total_learned(1).await {
            warn!(word = %key, error = %err, "failed to bump learned counter");
        }
        Ok(Upsert::Created)
    }

    async fn should_trigger(&self, config: &LearningConfig, pending_count: usize) -> bool {
        let is_processing = match self.store.is_processing().await {
            Ok(flag) => flag,
            Err(err) => {
                warn!(error = %err, "processing guard unreadable, not triggering");
                return false;
            }
        };
        config.should_trigger_pr(pending_count, is_processing)
    }

    async fn note_pending_count(&self, pending_count: usize) {
        if let Err(err) = self.store.record_pending_count(pending_count).await {
            warn!(error = %err, "failed to record pending count");
        }
    }
}

fn clean_translations(translations: BTreeMap<String, String>) -> BTreeMap<String, String> {
    translations
        .into_iter()
        .filter_map(|(lang, value)| {
            let lang = normalize_word(&lang);
            let value = value.trim().to_string();
            (!lang.is_empty() && !value.is_empty()).then_some((lang, value))
        })
        .collect()
}

fn normalize_language(lang: Option<&str>) -> String {
    lang.map(normalize_word)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "auto".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(confidence: f64, context: Option<&str>) -> Observation {
        Observation {
            translations: BTreeMap::from([("es".to_string(), "casa".to_string())]),
            confidence,
            pos: None,
            context: context.map(String::from),
        }
    }

    #[test]
    fn repeated_observations_average_towards_incoming() {
        let now = Utc::now();
        let mut record = LearnedWord::new(
            "house".into(),
            "en".into(),
            observation(0.7, None),
            LearnedSource::Ai,
            now,
        );
        let mut seen = vec![record.confidence];
        for _ in 0..3 {
            record.absorb(observation(0.6, None), now);
            seen.push(record.confidence);
        }
        let expected = [0.7, 0.65, 0.625, 0.6125];
        for (got, want) in seen.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(record.seen_count, 4);
    }

    #[test]
    fn context_window_keeps_five_most_recent() {
        let now = Utc::now();
        let mut record = LearnedWord::new(
            "house".into(),
            "en".into(),
            observation(0.7, Some("c0")),
            LearnedSource::Ai,
            now,
        );
        for i in 1..8 {
            record.absorb(observation(0.7, Some(&format!("c{i}"))), now);
        }
        assert_eq!(record.contexts, vec!["c3", "c4", "c5", "c6", "c7"]);
    }

    #[test]
    fn later_translations_overwrite_same_language() {
        let now = Utc::now();
        let mut record = LearnedWord::new(
            "house".into(),
            "en".into(),
            observation(0.7, None),
            LearnedSource::Ai,
            now,
        );
        record.absorb(
            Observation {
                translations: BTreeMap::from([
                    ("es".to_string(), "hogar".to_string()),
                    ("fr".to_string(), "maison".to_string()),
                ]),
                confidence: 0.7,
                pos: Some("noun".into()),
                context: None,
            },
            now,
        );
        assert_eq!(record.translations["es"], "hogar");
        assert_eq!(record.translations["fr"], "maison");
        assert_eq!(record.detected_pos.as_deref(), Some("noun"));
    }

    #[test]
    fn should_trigger_truth_table() {
        let mut config = LearningConfig::default();
        assert!(config.should_trigger_pr(10, false));
        assert!(!config.should_trigger_pr(9, false));
        assert!(!config.should_trigger_pr(10, true));
        config.auto_trigger = false;
        assert!(!config.should_trigger_pr(10, false));
    }

    #[test]
    fn qualification_is_either_bar() {
        let now = Utc::now();
        let mut record = LearnedWord::new(
            "house".into(),
            "en".into(),
            observation(0.4, None),
            LearnedSource::Ai,
            now,
        );
        assert!(!record.qualifies(0.7));
        record.seen_count = 3;
        assert!(record.qualifies(0.7));
        record.seen_count = 1;
        record.confidence = 0.7;
        assert!(record.qualifies(0.7));
    }

    #[test]
    fn tier_caps() {
        let config = LearningConfig::default();
        assert_eq!(BulkTier::Small.cap(&config), Some(100));
        assert_eq!(BulkTier::Medium.cap(&config), Some(500));
        assert_eq!(BulkTier::Large.cap(&config), Some(1000));
        assert_eq!(BulkTier::Unlimited.cap(&config), None);
    }

    #[test]
    fn confidence_clamping() {
        assert_eq!(clamp_confidence(1.7), Some(1.0));
        assert_eq!(clamp_confidence(-0.2), Some(0.0));
        assert_eq!(clamp_confidence(f64::NAN), None);
    }

    #[test]
    fn word_length_bounds() {
        assert!(!is_valid_word_length("a"));
        assert!(is_valid_word_length("ab"));
        assert!(is_valid_word_length(&"x".repeat(50)));
        assert!(!is_valid_word_length(&"x".repeat(51)));
    }

    #[test]
    fn config_validation_rejects_bad_threshold() {
        let config = LearningConfig {
            pr_threshold: 0,
            ..LearningConfig::default()
        };
        assert!(matches!(config.validate(), Err(LearningError::Validation(_))));
    }
}
