//! Embedded lexicon: an immutable `word -> DictionaryEntry` table loaded once
//! at startup from JSON Lines.
//!
//! Each non-comment line is one entry, e.g.
//! `{"word":"hello","translations":{"es":"hola"},"pos":"interjection"}`.
//! Lines starting with `#` or `//` are ignored; the contribution workflow
//! inserts new entries directly above [`INSERT_MARKER`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable insertion point for contributed entries in the canonical source.
pub const INSERT_MARKER: &str = "# @learned-words: new entries are inserted above this line";

const EMBEDDED_SEED: &str = include_str!("../../data/lexicon.jsonl");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etymology: Option<EtymologyData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    /// 1 is the most common word.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<String>>,
}

impl DictionaryEntry {
    /// A language resolves when its key is present, even if the value equals
    /// the source word.
    pub fn translation(&self, lang: &str) -> Option<&str> {
        self.translations.get(lang).map(String::as_str)
    }

    pub fn has_etymology(&self) -> bool {
        self.etymology.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cognate {
    pub word: String,
    pub language: String,
}

/// Partial by construction: a missing field means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtymologyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognates: Option<Vec<Cognate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution: Option<Vec<String>>,
}

impl EtymologyData {
    pub fn unknown() -> Self {
        Self {
            origin: Some("Unknown".to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.origin.is_none()
            && self.original_form.is_none()
            && self.meaning.is_none()
            && self.root.is_none()
            && self.root_language.is_none()
            && self.cognates.as_ref().map_or(true, Vec::is_empty)
            && self.first_use.is_none()
            && self.evolution.as_ref().map_or(true, Vec::is_empty)
    }
}

/// One line of the JSONL source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconLine {
    pub word: String,
    #[serde(flatten)]
    pub entry: DictionaryEntry,
}

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read lexicon file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid lexicon entry on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct LexiconStore {
    entries: HashMap<String, DictionaryEntry>,
}

impl LexiconStore {
    pub fn embedded() -> Result<Self, LexiconError> {
        Self::parse_jsonl(EMBEDDED_SEED)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, LexiconError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse_jsonl(&raw)
    }

    pub fn parse_jsonl(source: &str) -> Result<Self, LexiconError> {
        Ok(Self::from_lines(parse_lexicon_lines(source)?))
    }

    pub fn from_lines(lines: impl IntoIterator<Item = LexiconLine>) -> Self {
        let mut entries = HashMap::new();
        let mut aliases = Vec::new();

        for line in lines {
            let key = normalize_word(&line.word);
            if key.is_empty() {
                continue;
            }
            if let Some(variants) = &line.entry.variants {
                aliases.extend(variants.iter().map(|v| (normalize_word(v), key.clone())));
            }
            entries.insert(key, line.entry);
        }

        // Variants never shadow a headword of their own.
        for (alias, target) in aliases {
            if alias.is_empty() || entries.contains_key(&alias) {
                continue;
            }
            if let Some(entry) = entries.get(&target).cloned() {
                entries.insert(alias, entry);
            }
        }

        Self { entries }
    }

    pub fn get(&self, word: &str) -> Option<&DictionaryEntry> {
        self.entries.get(&normalize_word(word))
    }

    pub fn translate(&self, word: &str, lang: &str) -> Option<&str> {
        self.get(word)?.translation(lang)
    }

    pub fn etymology(&self, word: &str) -> Option<&EtymologyData> {
        self.get(word)?.etymology.as_ref().filter(|e| !e.is_empty())
    }

    pub fn contains(&self, word: &str) -> bool {
        self.get(word).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn parse_lexicon_lines(source: &str) -> Result<Vec<LexiconLine>, LexiconError> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        if is_comment_or_blank(raw) {
            continue;
        }
        let line = serde_json::from_str::<LexiconLine>(raw.trim())
            .map_err(|source| LexiconError::Parse { line: idx + 1, source })?;
        lines.push(line);
    }
    Ok(lines)
}

pub fn is_comment_or_blank(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//")
}

/// Lookup key form shared by every tier: trimmed and lowercased.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_seed_parses() {
        let store = LexiconStore::embedded().unwrap();
        assert!(store.len() > 10);
        assert_eq!(store.translate("hello", "es"), Some("hola"));
        assert!(store.etymology("hello").is_some());
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let store = LexiconStore::embedded().unwrap();
        assert_eq!(store.translate("  HeLLo ", "fr"), Some("bonjour"));
    }

    #[test]
    fn variants_resolve_to_headword() {
        let store = LexiconStore::parse_jsonl(
            r#"{"word":"color","translations":{"es":"color"},"variants":["colour"]}"#,
        )
        .unwrap();
        assert_eq!(store.translate("colour", "es"), Some("color"));
    }

    #[test]
    fn identical_translation_still_resolves() {
        let store = LexiconStore::parse_jsonl(
            r#"{"word":"taxi","translations":{"es":"taxi"}}"#,
        )
        .unwrap();
        assert_eq!(store.translate("taxi", "es"), Some("taxi"));
        assert_eq!(store.translate("taxi", "de"), None);
    }

    #[test]
    fn parse_error_reports_line() {
        let err = LexiconStore::parse_jsonl("# header\n{\"word\":\"a\"}\nnot json").unwrap_err();
        match err {
            LexiconError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_from_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# local override").unwrap();
        writeln!(file, r#"{{"word":"river","translations":{{"es":"río"}}}}"#).unwrap();
        writeln!(file, "{INSERT_MARKER}").unwrap();

        let store = LexiconStore::load_path(file.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.translate("river", "es"), Some("río"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LexiconStore::load_path(dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, LexiconError::Io(_)));
    }

    #[test]
    fn unknown_etymology_is_not_empty() {
        assert!(!EtymologyData::unknown().is_empty());
        assert!(EtymologyData::default().is_empty());
    }
}
