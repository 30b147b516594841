//! Etymology orchestrator: lexicon, edge cache, external lexicon, AI cascade,
//! and finally a terminal "Unknown" record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::EdgeCache;
use crate::config::PipelineSettings;
use crate::lexicon::{normalize_word, EtymologyData, LexiconStore};
use crate::services::ai_cascade::{AiCascade, JsonOutcome};
use crate::services::llm_provider::{InferenceRequest, JsonSchema};
use crate::services::wiktionary::{ExternalEntry, ExternalLexicon};

const MAX_WORD_CHARS: usize = 100;
const DEFAULT_LANGUAGE: &str = "en";

const ETYMOLOGY_SYSTEM_PROMPT: &str = "You are a historical linguist. Reply with one JSON object \
describing the word's etymology. Leave out any field you are not confident about.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EtymologySource {
    Dictionary,
    Cache,
    Wiktionary,
    Ai,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullEtymology {
    pub word: String,
    pub language: String,
    pub etymology: EtymologyData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pronunciations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etymology_text: Option<String>,
    /// Raw AI output that could not be parsed into fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source: EtymologySource,
    pub cached: bool,
}

impl FullEtymology {
    fn new(word: &str, language: &str, etymology: EtymologyData, source: EtymologySource) -> Self {
        Self {
            word: word.to_string(),
            language: language.to_string(),
            etymology,
            definitions: Vec::new(),
            pronunciations: Vec::new(),
            etymology_text: None,
            notes: None,
            source,
            cached: false,
        }
    }

    fn with_external(mut self, external: Option<&ExternalEntry>) -> Self {
        if let Some(entry) = external {
            self.definitions = entry.definitions.clone();
            self.pronunciations = entry.pronunciations.clone();
            self.etymology_text = entry.etymology_text.clone();
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum EtymologyError {
    #[error("{0}")]
    Validation(String),
}

pub struct EtymologyService {
    lexicon: Arc<LexiconStore>,
    cache: EdgeCache,
    external: Arc<dyn ExternalLexicon>,
    cascade: Arc<AiCascade>,
    settings: PipelineSettings,
}

impl EtymologyService {
    pub fn new(
        lexicon: Arc<LexiconStore>,
        cache: EdgeCache,
        external: Arc<dyn ExternalLexicon>,
        cascade: Arc<AiCascade>,
        settings: PipelineSettings,
    ) -> Self {
        Self { lexicon, cache, external, cascade, settings }
    }

    pub async fn get_full_etymology(&self, word: &str, lang: Option<&str>) -> Result<FullEtymology, EtymologyError> {
        let word = normalize_word(word);
        if word.is_empty() {
            return Err(EtymologyError::Validation("word is required".into()));
        }
        if word.chars().count() > MAX_WORD_CHARS {
            return Err(EtymologyError::Validation(format!(
                "word must be at most {MAX_WORD_CHARS} characters"
            )));
        }
        let lang = lang
            .map(normalize_word)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        // Lexicon keys are English headwords; the lookup is local so it is not cached.
        if lang == DEFAULT_LANGUAGE {
            if let Some(etymology) = self.lexicon.etymology(&word) {
                return Ok(FullEtymology::new(&word, &lang, etymology.clone(), EtymologySource::Dictionary));
            }
        }

        let key = self.cache.etymology_key(&lang, &word);
        if let Some(mut hit) = self.cache.get::<FullEtymology>(&key).await {
            hit.cached = true;
            return Ok(hit);
        }

        let external = match self.external.lookup(&word, &lang).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%word, %lang, error = %err, "external lexicon lookup failed");
                None
            }
        };

        if let Some(entry) = external.as_ref().filter(|e| e.etymology_text.is_some()) {
            let etymology = entry.etymology.clone().unwrap_or_else(EtymologyData::unknown);
            let result = FullEtymology::new(&word, &lang, etymology, EtymologySource::Wiktionary)
                .with_external(Some(entry));
            self.cache.put(&key, &result, self.settings.etymology_ttl).await;
            return Ok(result);
        }

        if self.cascade.is_available() {
            match self.cascade.complete_json::<EtymologyData>(&etymology_request(&word, &lang)).await {
                Ok(JsonOutcome::Structured { value, strategy }) if !value.is_empty() => {
                    debug!(%word, %strategy, "etymology generated by AI");
                    let result = FullEtymology::new(&word, &lang, value, EtymologySource::Ai)
                        .with_external(external.as_ref());
                    self.cache.put(&key, &result, self.settings.etymology_ttl).await;
                    return Ok(result);
                }
                Ok(JsonOutcome::Structured { .. }) => {
                    debug!(%word, "AI returned an empty etymology");
                }
                Ok(JsonOutcome::Unstructured { raw }) => {
                    let mut result =
                        FullEtymology::new(&word, &lang, EtymologyData::unknown(), EtymologySource::Ai)
                            .with_external(external.as_ref());
                    result.notes = Some(raw);
                    return Ok(result);
                }
                Err(err) => warn!(%word, error = %err, "AI etymology failed"),
            }
        }

        Ok(FullEtymology::new(&word, &lang, EtymologyData::unknown(), EtymologySource::None)
            .with_external(external.as_ref()))
    }
}

fn etymology_request(word: &str, lang: &str) -> InferenceRequest {
    let prompt = format!(
        "Give the etymology of the word \"{word}\" (language code `{lang}`). Fields: origin \
         (language of the immediate source), originalForm, meaning, root, rootLanguage, \
         cognates (list of {{word, language}}), firstUse, evolution (list of historical forms, \
         oldest last)."
    );
    InferenceRequest::new(ETYMOLOGY_SYSTEM_PROMPT, prompt).with_schema(JsonSchema {
        name: "etymology",
        schema: etymology_schema(),
    })
}

fn etymology_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "origin": { "type": "string" },
            "originalForm": { "type": "string" },
            "meaning": { "type": "string" },
            "root": { "type": "string" },
            "rootLanguage": { "type": "string" },
            "cognates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "word": { "type": "string" },
                        "language": { "type": "string" }
                    },
                    "required": ["word", "language"]
                }
            },
            "firstUse": { "type": "string" },
            "evolution": { "type": "array", "items": { "type": "string" } }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_camel_case_without_empty_fields() {
        let result = FullEtymology::new("hello", "en", EtymologyData::unknown(), EtymologySource::None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "word": "hello",
                "language": "en",
                "etymology": { "origin": "Unknown" },
                "source": "none",
                "cached": false
            })
        );
    }

    #[test]
    fn prompt_carries_schema() {
        let request = etymology_request("water", "en");
        assert_eq!(request.json_schema.as_ref().map(|s| s.name), Some("etymology"));
        assert!(request.messages[1].content.contains("\"water\""));
    }
}
