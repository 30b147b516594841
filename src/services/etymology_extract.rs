//! Heuristic etymology fields from cleaned prose. Each field owns an ordered
//! list of rules and the first rule that matches anything wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::lexicon::{Cognate, EtymologyData};

/// Language name: optional period qualifier, optional `Proto-`, then a
/// capitalized word optionally hyphenated (`Proto-Indo-European`).
const LANG: &str = r"(?:(?:Old|Middle|Late|Early|Medieval|Vulgar|Ancient|Classical|Modern|Ecclesiastical|New) )?(?:Proto-)?[A-Z][a-z]+(?:-[A-Z][a-z]+)?";
const WORD: &str = r"\*?[\p{L}\p{M}'-]+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    First,
    Last,
    All,
}

/// A pattern whose `v` capture group (or whole match) is the field value.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub name: &'static str,
    pattern: Regex,
    occurrence: Occurrence,
}

impl ExtractionRule {
    pub fn new(name: &'static str, pattern: &str, occurrence: Occurrence) -> Result<Self, regex::Error> {
        Ok(Self { name, pattern: Regex::new(pattern)?, occurrence })
    }

    pub fn apply(&self, text: &str) -> Vec<String> {
        let mut values = self.pattern.captures_iter(text).filter_map(|caps| {
            let value = caps.name("v").or_else(|| caps.get(0))?.as_str().trim();
            (!value.is_empty()).then(|| value.to_string())
        });
        match self.occurrence {
            Occurrence::First => values.next().into_iter().collect(),
            Occurrence::Last => values.last().into_iter().collect(),
            Occurrence::All => values.collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub origin: Vec<ExtractionRule>,
    pub original_form: Vec<ExtractionRule>,
    pub meaning: Vec<ExtractionRule>,
    pub root: Vec<ExtractionRule>,
    pub root_language: Vec<ExtractionRule>,
    pub cognates: Vec<ExtractionRule>,
    pub first_use: Vec<ExtractionRule>,
    pub evolution: Vec<ExtractionRule>,
}

impl FieldRules {
    pub fn standard() -> Result<Self, regex::Error> {
        use Occurrence::{All, First, Last};

        Ok(Self {
            origin: vec![
                ExtractionRule::new("borrowed", &format!(r"(?:[Bb]orrowed|[Bb]orrowing) from (?P<v>{LANG})"), First)?,
                ExtractionRule::new("from", &format!(r"[Ff]rom (?P<v>{LANG})"), First)?,
                ExtractionRule::new("of-origin", &format!(r"of (?P<v>{LANG}) origin"), First)?,
            ],
            original_form: vec![
                ExtractionRule::new("borrowed", &format!(r"(?:[Bb]orrowed|[Bb]orrowing) from {LANG} (?P<v>{WORD})"), First)?,
                ExtractionRule::new("from", &format!(r"[Ff]rom {LANG} (?P<v>{WORD})"), First)?,
            ],
            meaning: vec![
                ExtractionRule::new("literally", r#"[Ll]iterally,? [“"](?P<v>[^”"]+)[”"]"#, First)?,
                ExtractionRule::new("gloss", r"\(“(?P<v>[^”]+)”\)", First)?,
                ExtractionRule::new("meaning", r#"meaning [“"](?P<v>[^”"]+)[”"]"#, First)?,
            ],
            root: vec![
                ExtractionRule::new("ultimately", &format!(r"[Uu]ltimately from {LANG} (?P<v>{WORD})"), First)?,
                ExtractionRule::new("root", r"root (?P<v>\*[\p{L}\p{M}'-]+)", First)?,
                ExtractionRule::new("last-from", &format!(r"[Ff]rom {LANG} (?P<v>{WORD})"), Last)?,
            ],
            root_language: vec![
                ExtractionRule::new("ultimately", &format!(r"[Uu]ltimately from (?P<v>{LANG})"), First)?,
                ExtractionRule::new("last-from", &format!(r"[Ff]rom (?P<v>{LANG})"), Last)?,
            ],
            cognates: vec![ExtractionRule::new(
                "cognate-list",
                r"[Cc]ognates? (?:with|to|include) (?P<v>[^.;]+)",
                First,
            )?],
            first_use: vec![
                ExtractionRule::new(
                    "attested",
                    r"(?:[Ff]irst (?:attested|recorded|used)|[Aa]ttested)(?: in| from| since| around)* (?:the )?(?P<v>(?:c\. ?)?\d{3,4}s?|\d{1,2}(?:st|nd|rd|th) century)",
                    First,
                )?,
                ExtractionRule::new("century", r"(?P<v>\d{1,2}(?:st|nd|rd|th) century)", First)?,
            ],
            evolution: vec![ExtractionRule::new("chain", &format!(r"[Ff]rom (?P<v>{LANG} {WORD})"), All)?],
        })
    }
}

static STANDARD_RULES: LazyLock<FieldRules> =
    LazyLock::new(|| FieldRules::standard().unwrap());
static COGNATE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?P<lang>{LANG}) (?P<word>{WORD})")).unwrap());
static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",|\band\b|\bor\b").unwrap());

#[derive(Debug, Clone)]
pub struct EtymologyExtractor {
    rules: FieldRules,
}

impl Default for EtymologyExtractor {
    fn default() -> Self {
        Self::new(STANDARD_RULES.clone())
    }
}

impl EtymologyExtractor {
    pub fn new(rules: FieldRules) -> Self {
        Self { rules }
    }

    pub fn extract(&self, text: &str) -> EtymologyData {
        let rules = &self.rules;
        EtymologyData {
            origin: first_value(&rules.origin, text),
            original_form: first_value(&rules.original_form, text),
            meaning: first_value(&rules.meaning, text),
            root: first_value(&rules.root, text),
            root_language: first_value(&rules.root_language, text),
            cognates: first_value(&rules.cognates, text)
                .map(|list| parse_cognates(&list))
                .filter(|c| !c.is_empty()),
            first_use: first_value(&rules.first_use, text),
            evolution: first_match(&rules.evolution, text),
        }
    }
}

fn first_match(rules: &[ExtractionRule], text: &str) -> Option<Vec<String>> {
    rules.iter().map(|rule| rule.apply(text)).find(|values| !values.is_empty())
}

fn first_value(rules: &[ExtractionRule], text: &str) -> Option<String> {
    first_match(rules, text).and_then(|values| values.into_iter().next())
}

fn parse_cognates(list: &str) -> Vec<Cognate> {
    LIST_SPLIT_RE
        .split(list)
        .filter_map(|item| {
            let caps = COGNATE_ITEM_RE.captures(item.trim())?;
            Some(Cognate {
                language: caps["lang"].to_string(),
                word: caps["word"].to_string(),
            })
        })
        .collect()
}
