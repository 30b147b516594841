//! External lexicon tier: raw Wiktionary wikitext, reduced to the requested
//! language section and parsed into etymology, definitions and pronunciations.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::lexicon::EtymologyData;
use crate::services::etymology_extract::EtymologyExtractor;
use crate::services::markup::{clean_markup, language_name};

const MAX_DEFINITIONS: usize = 5;
const USER_AGENT: &str = concat!("lexis-backend/", env!("CARGO_PKG_VERSION"));

const POS_HEADINGS: &[&str] = &[
    "Noun",
    "Proper noun",
    "Verb",
    "Adjective",
    "Adverb",
    "Pronoun",
    "Preposition",
    "Conjunction",
    "Interjection",
    "Determiner",
    "Article",
    "Numeral",
    "Particle",
    "Phrase",
];

static IPA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{IPA\|[^|{}]*\|([^{}]+)\}\}").unwrap());

#[derive(Debug, Error)]
pub enum LexiconFetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEntry {
    pub etymology_text: Option<String>,
    pub etymology: Option<EtymologyData>,
    pub definitions: Vec<String>,
    pub pronunciations: Vec<String>,
    pub pos: Option<String>,
}

#[async_trait]
pub trait ExternalLexicon: Send + Sync {
    /// `Ok(None)` when the page or the language section does not exist.
    async fn lookup(&self, word: &str, lang: &str) -> Result<Option<ExternalEntry>, LexiconFetchError>;
}

#[derive(Clone)]
pub struct WiktionaryClient {
    client: reqwest::Client,
    base_url: String,
    extractor: EtymologyExtractor,
}

impl WiktionaryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extractor: EtymologyExtractor::default(),
        }
    }

    fn raw_url(&self, word: &str) -> String {
        format!(
            "{}/w/index.php?title={}&action=raw",
            self.base_url,
            urlencoding::encode(word)
        )
    }
}

#[async_trait]
impl ExternalLexicon for WiktionaryClient {
    async fn lookup(&self, word: &str, lang: &str) -> Result<Option<ExternalEntry>, LexiconFetchError> {
        let resp = self.client.get(self.raw_url(word)).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(%word, "no wiktionary page");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LexiconFetchError::HttpStatus(status));
        }
        let raw = resp.text().await?;
        Ok(parse_wikitext(&raw, lang, &self.extractor))
    }
}

/// Parses a raw page. `None` when the language section is absent or yields
/// nothing usable.
pub fn parse_wikitext(raw: &str, lang: &str, extractor: &EtymologyExtractor) -> Option<ExternalEntry> {
    let section = language_section(raw, &language_name(lang))?;

    let mut entry = ExternalEntry::default();
    let mut current: Option<String> = None;
    let mut etymology_raw = String::new();

    for line in section.lines() {
        if let Some((_, title)) = heading(line) {
            current = Some(title.to_string());
            if entry.pos.is_none() && POS_HEADINGS.contains(&title) {
                entry.pos = Some(title.to_lowercase());
            }
            continue;
        }
        let Some(title) = current.as_deref() else {
            continue;
        };

        // Only the first etymology block describes the primary sense.
        if title == "Etymology" || title == "Etymology 1" {
            etymology_raw.push_str(line);
            etymology_raw.push('\n');
        } else if title == "Pronunciation" {
            for caps in IPA_RE.captures_iter(line) {
                entry.pronunciations.extend(
                    caps[1]
                        .split('|')
                        .map(str::trim)
                        .filter(|p| p.starts_with('/') || p.starts_with('['))
                        .map(str::to_string),
                );
            }
        } else if POS_HEADINGS.contains(&title) && entry.definitions.len() < MAX_DEFINITIONS {
            if let Some(definition) = line.strip_prefix("# ") {
                let cleaned = clean_markup(definition);
                if !cleaned.is_empty() {
                    entry.definitions.push(cleaned);
                }
            }
        }
    }

    let etymology_text = clean_markup(&etymology_raw);
    if !etymology_text.is_empty() {
        let extracted = extractor.extract(&etymology_text);
        entry.etymology = (!extracted.is_empty()).then_some(extracted);
        entry.etymology_text = Some(etymology_text);
    }

    let has_content = entry.etymology_text.is_some()
        || !entry.definitions.is_empty()
        || !entry.pronunciations.is_empty();
    has_content.then_some(entry)
}

/// Lines between `==Language==` and the next level-2 heading.
fn language_section<'a>(raw: &'a str, language: &str) -> Option<&'a str> {
    let mut start: Option<usize> = None;
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if let Some((2, title)) = heading(line) {
            match start {
                Some(begin) => return Some(&raw[begin..offset]),
                None if title == language => start = Some(offset + line.len()),
                None => {}
            }
        }
        offset += line.len();
    }
    start.map(|begin| &raw[begin..])
}

/// `===Title===` -> `(3, "Title")`.
fn heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim();
    let level = line.chars().take_while(|c| *c == '=').count();
    if level < 2 || line.len() <= level * 2 {
        return None;
    }
    let trailing = line.chars().rev().take_while(|c| *c == '=').count();
    if trailing != level {
        return None;
    }
    let title = line[level..line.len() - level].trim();
    (!title.is_empty()).then_some((level, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
==English==
{{wikipedia}}

===Etymology===
From {{inh|en|enm|water}}, from {{inh|en|ang|wæter||water}}, from {{inh|en|gem-pro|*watōr}}.
Cognate with {{cog|de|Wasser}}.

===Pronunciation===
* {{IPA|en|/ˈwɔːtə/|[ˈwɔːtə]}}

===Noun===
{{en-noun}}

# A clear liquid [[substance]].
#: {{ux|en|a glass of water}}
# {{lb|en|chemistry}} [[H2O]].

==Dutch==

===Noun===
# something else
";

    #[test]
    fn parses_english_section() {
        let entry = parse_wikitext(PAGE, "en", &EtymologyExtractor::default()).unwrap();
        assert_eq!(
            entry.etymology_text.as_deref(),
            Some("From Middle English water, from Old English wæter (“water”), from Proto-Germanic *watōr.\nCognate with German Wasser.")
        );
        let etymology = entry.etymology.unwrap();
        assert_eq!(etymology.origin.as_deref(), Some("Middle English"));
        assert_eq!(etymology.root_language.as_deref(), Some("Proto-Germanic"));
        assert_eq!(entry.pronunciations, vec!["/ˈwɔːtə/", "[ˈwɔːtə]"]);
        assert_eq!(entry.pos.as_deref(), Some("noun"));
        assert_eq!(entry.definitions, vec!["A clear liquid substance.", "H2O."]);
    }

    #[test]
    fn missing_language_section_is_none() {
        assert!(parse_wikitext(PAGE, "fr", &EtymologyExtractor::default()).is_none());
    }

    #[test]
    fn other_sections_do_not_leak() {
        let entry = parse_wikitext(PAGE, "nl", &EtymologyExtractor::default()).unwrap();
        assert_eq!(entry.definitions, vec!["something else"]);
        assert!(entry.etymology.is_none());
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading("===Etymology 1==="), Some((3, "Etymology 1")));
        assert_eq!(heading("==English=="), Some((2, "English")));
        assert_eq!(heading("== =="), None);
        assert_eq!(heading("===Noun=="), None);
    }

    #[test]
    fn raw_url_encodes_title() {
        let client = WiktionaryClient::new("https://en.wiktionary.org/", Duration::from_secs(1));
        assert_eq!(
            client.raw_url("ice cream"),
            "https://en.wiktionary.org/w/index.php?title=ice%20cream&action=raw"
        );
    }
}
