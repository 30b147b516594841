//! Ordered model strategies: each attempt is bounded by its own timeout and a
//! failure (error, timeout, unusable output) moves on to the next strategy.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::CascadeSettings;
use crate::services::llm_provider::{InferenceBackend, InferenceRequest};

const TRANSLATE_SYSTEM_PROMPT: &str = "You are a translation engine. Translate the user's text \
faithfully and reply with the translation only: no quotes, notes or explanations.";

#[derive(Debug, Clone)]
pub struct ModelStrategy {
    pub name: String,
    pub model: String,
    pub timeout: Duration,
}

impl ModelStrategy {
    pub fn new(name: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { name: name.into(), model: model.into(), timeout }
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("AI inference is not configured")]
    Unavailable,
    #[error("all {attempts} AI strategies failed")]
    Exhausted { attempts: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub strategy: String,
}

/// Result of a schema-constrained call. When no strategy produced parseable
/// JSON but one produced text, the last text is handed back raw.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonOutcome<T> {
    Structured { value: T, strategy: String },
    Unstructured { raw: String },
}

pub struct AiCascade {
    backend: Arc<dyn InferenceBackend>,
    strategies: Vec<ModelStrategy>,
}

impl AiCascade {
    pub fn new(backend: Arc<dyn InferenceBackend>, strategies: Vec<ModelStrategy>) -> Self {
        Self { backend, strategies }
    }

    pub fn from_settings(backend: Arc<dyn InferenceBackend>, settings: &CascadeSettings) -> Self {
        let mut strategies = vec![ModelStrategy::new(
            "fast",
            settings.fast_model.clone(),
            settings.attempt_timeout,
        )];
        if settings.fallback_model != settings.fast_model {
            strategies.push(ModelStrategy::new(
                "fallback",
                settings.fallback_model.clone(),
                settings.attempt_timeout,
            ));
        }
        Self::new(backend, strategies)
    }

    pub fn strategies(&self) -> &[ModelStrategy] {
        &self.strategies
    }

    pub fn is_available(&self) -> bool {
        !self.strategies.is_empty() && self.backend.is_available()
    }

    pub async fn complete_text(&self, request: &InferenceRequest) -> Result<Completion, CascadeError> {
        if !self.is_available() {
            return Err(CascadeError::Unavailable);
        }
        for strategy in &self.strategies {
            if let Some(text) = self.attempt(strategy, request).await {
                return Ok(Completion { text, strategy: strategy.name.clone() });
            }
        }
        Err(CascadeError::Exhausted { attempts: self.strategies.len() })
    }

    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        request: &InferenceRequest,
    ) -> Result<JsonOutcome<T>, CascadeError> {
        if !self.is_available() {
            return Err(CascadeError::Unavailable);
        }
        let mut last_raw: Option<String> = None;
        for strategy in &self.strategies {
            let Some(raw) = self.attempt(strategy, request).await else {
                continue;
            };
            match serde_json::from_str::<T>(&extract_json(&raw)) {
                Ok(value) => {
                    return Ok(JsonOutcome::Structured { value, strategy: strategy.name.clone() });
                }
                Err(err) => {
                    warn!(strategy = %strategy.name, error = %err, "AI output is not the expected JSON");
                    last_raw = Some(raw);
                }
            }
        }
        match last_raw {
            Some(raw) => Ok(JsonOutcome::Unstructured { raw }),
            None => Err(CascadeError::Exhausted { attempts: self.strategies.len() }),
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
        context: Option<&str>,
    ) -> Result<Completion, CascadeError> {
        let source = if from == "auto" {
            "the detected source language".to_string()
        } else {
            format!("language `{from}`")
        };
        let mut prompt = format!("Translate from {source} into language `{to}`.\n");
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("Context: {}\n", ctx.trim()));
        }
        prompt.push_str("Text:\n");
        prompt.push_str(text);

        let request = InferenceRequest::new(TRANSLATE_SYSTEM_PROMPT, prompt);
        let mut completion = self.complete_text(&request).await?;
        completion.text = strip_wrapping_quotes(&completion.text).to_string();
        Ok(completion)
    }

    async fn attempt(&self, strategy: &ModelStrategy, request: &InferenceRequest) -> Option<String> {
        match timeout(strategy.timeout, self.backend.run(&strategy.model, request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!(strategy = %strategy.name, model = %strategy.model, "AI strategy succeeded");
                Some(text)
            }
            Ok(Ok(_)) => {
                warn!(strategy = %strategy.name, "AI strategy returned empty output");
                None
            }
            Ok(Err(err)) => {
                warn!(strategy = %strategy.name, error = %err, "AI strategy failed");
                None
            }
            Err(_) => {
                warn!(strategy = %strategy.name, timeout_ms = strategy.timeout.as_millis() as u64, "AI strategy timed out");
                None
            }
        }
    }
}

/// Pulls a JSON object out of model output, tolerating prose and code fences.
pub fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_marker = &trimmed[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return after_marker[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

fn strip_wrapping_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    for (open, close) in [('"', '"'), ('“', '”'), ('\'', '\'')] {
        if let Some(inner) = trimmed.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            if !inner.contains(open) {
                return inner.trim();
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let response = "Here you go:\n```json\n{\"origin\": \"Latin\"}\n```";
        assert_eq!(extract_json(response), "{\"origin\": \"Latin\"}");
    }

    #[test]
    fn extracts_bare_json_inside_prose() {
        let response = "Sure! {\"origin\": \"Latin\"} Hope that helps.";
        assert_eq!(extract_json(response), "{\"origin\": \"Latin\"}");
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(extract_json("  no json here "), "no json here");
    }

    #[test]
    fn strips_quotes_around_whole_output() {
        assert_eq!(strip_wrapping_quotes("\"hola mundo\""), "hola mundo");
        assert_eq!(strip_wrapping_quotes("“bonjour”"), "bonjour");
        assert_eq!(strip_wrapping_quotes("say \"hi\""), "say \"hi\"");
    }
}
