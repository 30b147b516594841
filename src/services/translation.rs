//! Translation orchestrator: edge cache, then whole-text dictionary
//! resolution (lexicon, relational store), then the AI cascade. Tokens only
//! the AI could translate are reported to the learned word ledger.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::EdgeCache;
use crate::config::PipelineSettings;
use crate::db::DictionaryRepository;
use crate::lexicon::{normalize_word, DictionaryEntry, LexiconStore};
use crate::services::ai_cascade::{AiCascade, CascadeError};
use crate::services::contribution::ContributionTrigger;
use crate::services::learning::{is_valid_word_length, LearnedSource, LearningService, StoreOptions};

const AUTO_LANGUAGE: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Dictionary,
    Cache,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordAlignment {
    pub original: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated: Option<String>,
    pub known: bool,
    pub has_etymology: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub original: String,
    pub translated: String,
    pub from: String,
    pub to: String,
    pub cached: bool,
    pub source: ResolutionSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordAlignment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub from: Option<String>,
    pub to: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranslationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchTranslation {
    pub translations: Vec<BatchItem>,
    pub count: usize,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("{0}")]
    Validation(String),
    #[error("translation service unavailable")]
    Unavailable(#[source] CascadeError),
}

pub struct TranslationService {
    lexicon: Arc<LexiconStore>,
    dictionary: Arc<dyn DictionaryRepository>,
    cache: EdgeCache,
    cascade: Arc<AiCascade>,
    learning: Arc<LearningService>,
    trigger: Arc<ContributionTrigger>,
    settings: PipelineSettings,
}

impl TranslationService {
    pub fn new(
        lexicon: Arc<LexiconStore>,
        dictionary: Arc<dyn DictionaryRepository>,
        cache: EdgeCache,
        cascade: Arc<AiCascade>,
        learning: Arc<LearningService>,
        trigger: Arc<ContributionTrigger>,
        settings: PipelineSettings,
    ) -> Self {
        Self { lexicon, dictionary, cache, cascade, learning, trigger, settings }
    }

    pub async fn translate(&self, req: TranslateRequest) -> Result<TranslationResult, TranslationError> {
        let text = normalize_text(&req.text, self.settings.max_text_chars);
        if text.is_empty() {
            return Err(TranslationError::Validation("text is required".into()));
        }
        let to = normalize_word(&req.to);
        if to.is_empty() {
            return Err(TranslationError::Validation("target language is required".into()));
        }
        let from = req
            .from
            .as_deref()
            .map(normalize_word)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| AUTO_LANGUAGE.to_string());

        let key = self.cache.translation_key(&from, &to, &text);
        if !req.bypass_cache {
            if let Some(mut hit) = self.cache.get::<TranslationResult>(&key).await {
                hit.cached = true;
                hit.source = ResolutionSource::Cache;
                return Ok(hit);
            }
        }

        let tokens = tokenize(&text);
        let english_source = from == "en" || from == AUTO_LANGUAGE;
        let entries = if english_source {
            self.resolve_tokens(&tokens, &to).await
        } else {
            HashMap::new()
        };

        if english_source && !tokens.is_empty() && tokens.len() <= self.settings.max_dictionary_words {
            if let Some(words) = whole_text(&tokens, &entries, &to) {
                let result = TranslationResult {
                    original: text,
                    translated: words
                        .iter()
                        .filter_map(|w| w.translated.as_deref())
                        .collect::<Vec<_>>()
                        .join(" "),
                    from,
                    to,
                    cached: false,
                    source: ResolutionSource::Dictionary,
                    words,
                };
                self.cache.put(&key, &result, self.settings.translation_ttl).await;
                return Ok(result);
            }
        }

        let completion = self
            .cascade
            .translate(&text, &from, &to, req.context.as_deref())
            .await
            .map_err(TranslationError::Unavailable)?;
        debug!(strategy = %completion.strategy, tokens = tokens.len(), "translated via AI");

        let words = align(&tokens, &completion.text, &entries, &to);
        let result = TranslationResult {
            original: text,
            translated: completion.text,
            from,
            to,
            cached: false,
            source: ResolutionSource::Api,
            words,
        };
        self.cache.put(&key, &result, self.settings.translation_ttl).await;

        self.report_unknown(&result).await;
        Ok(result)
    }

    pub async fn translate_batch(
        &self,
        texts: Vec<String>,
        to: String,
        from: Option<String>,
    ) -> Result<BatchTranslation, TranslationError> {
        let max = self.settings.max_batch_texts;
        if texts.is_empty() || texts.len() > max {
            return Err(TranslationError::Validation(format!(
                "texts must contain between 1 and {max} entries"
            )));
        }

        let jobs = texts.into_iter().enumerate().map(|(index, text)| {
            let req = TranslateRequest {
                text,
                from: from.clone(),
                to: to.clone(),
                context: None,
                bypass_cache: false,
            };
            async move {
                match self.translate(req).await {
                    Ok(result) => BatchItem { index, result: Some(result), error: None },
                    Err(err) => BatchItem { index, result: None, error: Some(err.to_string()) },
                }
            }
        });

        let translations = join_all(jobs).await;
        Ok(BatchTranslation { count: translations.len(), translations })
    }

    /// Lexicon first, relational store for every token the lexicon cannot
    /// translate into `to`.
    async fn resolve_tokens(&self, tokens: &[String], to: &str) -> HashMap<String, DictionaryEntry> {
        let mut entries = HashMap::new();
        let mut misses = Vec::new();
        for token in tokens {
            if entries.contains_key(token) || misses.contains(token) {
                continue;
            }
            match self.lexicon.get(token) {
                Some(entry) if entry.translation(to).is_some() => {
                    entries.insert(token.clone(), entry.clone());
                }
                Some(entry) => {
                    entries.insert(token.clone(), entry.clone());
                    misses.push(token.clone());
                }
                None => misses.push(token.clone()),
            }
        }
        if !misses.is_empty() {
            for (word, entry) in self.dictionary.find_words(&misses).await {
                let keep_lexicon = entry.translation(to).is_none() && entries.contains_key(&word);
                if !keep_lexicon {
                    entries.insert(word, entry);
                }
            }
        }
        entries
    }

    /// Records every reportable unknown token with its aligned AI segment and
    /// kicks off a contribution when the ledger says so. Never fails the
    /// translation.
    async fn report_unknown(&self, result: &TranslationResult) {
        // One upsert per word; concurrent upserts of the same key lose updates.
        let mut seen = HashSet::new();
        let reports = result
            .words
            .iter()
            .filter(|w| !w.known && is_reportable(&w.original))
            .filter(|w| seen.insert(w.original.as_str()))
            .filter_map(|w| {
                let segment = w.translated.clone()?;
                let translations = BTreeMap::from([(result.to.clone(), segment)]);
                let opts = StoreOptions {
                    source_language: Some(result.from.clone()),
                    context: Some(result.original.clone()),
                    source: Some(LearnedSource::Ai),
                    ..StoreOptions::default()
                };
                Some(async move {
                    let outcome = self.learning.store_learned_word(&w.original, translations, opts).await;
                    (w.original.as_str(), outcome)
                })
            });

        let mut should_trigger = false;
        for (word, outcome) in join_all(reports).await {
            match outcome {
                Ok(outcome) => should_trigger |= outcome.should_trigger_pr,
                Err(err) => warn!(%word, error = %err, "failed to record learned word"),
            }
        }

        if should_trigger && self.trigger.is_configured() {
            self.trigger.spawn();
        }
    }
}

/// Collapses whitespace and truncates to `max_chars` characters.
pub fn normalize_text(raw: &str, max_chars: usize) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    }
}

/// Whitespace split, surrounding punctuation stripped, lowercased.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_reportable(token: &str) -> bool {
    is_valid_word_length(token) && !token.chars().all(|c| c.is_numeric() || c == '.' || c == ',')
}

/// All-or-nothing: `None` unless every token has a translation for `to`.
fn whole_text(
    tokens: &[String],
    entries: &HashMap<String, DictionaryEntry>,
    to: &str,
) -> Option<Vec<WordAlignment>> {
    tokens
        .iter()
        .map(|token| {
            let entry = entries.get(token)?;
            Some(WordAlignment {
                original: token.clone(),
                translated: Some(entry.translation(to)?.to_string()),
                known: true,
                has_etymology: entry.has_etymology(),
            })
        })
        .collect()
}

/// Best-effort positional pairing of tokens with AI output words. A
/// single-token text gets the whole output.
fn align(
    tokens: &[String],
    output: &str,
    entries: &HashMap<String, DictionaryEntry>,
    to: &str,
) -> Vec<WordAlignment> {
    let segments: Vec<&str> = output.split_whitespace().collect();
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let translated = if tokens.len() == 1 {
                Some(output.trim().to_string())
            } else {
                segments
                    .get(i)
                    .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                    .filter(|s| !s.is_empty())
            };
            let entry = entries.get(token);
            WordAlignment {
                original: token.clone(),
                translated,
                known: entry.and_then(|e| e.translation(to)).is_some(),
                has_etymology: entry.is_some_and(DictionaryEntry::has_etymology),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(lang: &str, value: &str) -> DictionaryEntry {
        DictionaryEntry {
            translations: BTreeMap::from([(lang.to_string(), value.to_string())]),
            ..DictionaryEntry::default()
        }
    }

    #[test]
    fn tokenizer_strips_punctuation_and_case() {
        assert_eq!(tokenize("¡Hello, World!  it's"), vec!["hello", "world", "it's"]);
        assert!(tokenize(" ... ").is_empty());
    }

    #[test]
    fn text_is_collapsed_and_truncated_on_char_boundary() {
        assert_eq!(normalize_text("  good \n morning ", 100), "good morning");
        assert_eq!(normalize_text("ñandú ñandú", 5), "ñandú");
    }

    #[test]
    fn whole_text_requires_every_token() {
        let entries = HashMap::from([
            ("good".to_string(), entry("es", "buen")),
            ("day".to_string(), entry("es", "día")),
        ]);
        let tokens = tokenize("Good day");
        let words = whole_text(&tokens, &entries, "es").unwrap();
        assert_eq!(words[1].translated.as_deref(), Some("día"));

        assert!(whole_text(&tokenize("good night"), &entries, "es").is_none());
        assert!(whole_text(&tokens, &entries, "fr").is_none());
    }

    #[test]
    fn identical_values_still_resolve() {
        let entries = HashMap::from([("taxi".to_string(), entry("es", "taxi"))]);
        assert!(whole_text(&tokenize("taxi"), &entries, "es").is_some());
    }

    #[test]
    fn alignment_pairs_by_position() {
        let entries = HashMap::from([("the".to_string(), entry("es", "el"))]);
        let words = align(&tokenize("the ocelot sleeps"), "el ocelote duerme.", &entries, "es");
        assert!(words[0].known);
        assert!(!words[1].known);
        assert_eq!(words[1].translated.as_deref(), Some("ocelote"));
        assert_eq!(words[2].translated.as_deref(), Some("duerme"));

        let single = align(&tokenize("ocelot"), "el ocelote", &entries, "es");
        assert_eq!(single[0].translated.as_deref(), Some("el ocelote"));
    }

    #[test]
    fn entry_without_target_language_is_not_known() {
        let entries = HashMap::from([("hello".to_string(), entry("es", "hola"))]);
        let words = align(&tokenize("hello world"), "こんにちは 世界", &entries, "ja");
        assert!(words.iter().all(|w| !w.known));
        assert_eq!(words[0].translated.as_deref(), Some("こんにちは"));
    }

    #[test]
    fn numbers_and_short_tokens_are_not_reported() {
        assert!(!is_reportable("42"));
        assert!(!is_reportable("3.14"));
        assert!(!is_reportable("x"));
        assert!(is_reportable("ocelot"));
    }
}
