//! Wikitext to plain text. Templates are rendered innermost-first until
//! nothing changes; the etymology family renders as `Language form (“gloss”)`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// One pass resolves one nesting level. Anything nested deeper is dropped.
const MAX_TEMPLATE_PASSES: usize = 32;

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^{}]*)\}\}").unwrap());
static REF_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<ref[^>/]*>.*?</ref\s*>").unwrap());
static REF_SELF_CLOSING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<ref[^>]*/>").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static NAMESPACED_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[(?:category|file|image):[^\]]*\]\]").unwrap());
static PIPED_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[[^\[\]|]*\|([^\[\]]*)\]\]").unwrap());
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\[\]]*)\]\]").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'{2,}").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +([,.;:)])").unwrap());

pub fn clean_markup(raw: &str) -> String {
    let mut text = COMMENT_RE.replace_all(raw, "").into_owned();
    text = REF_BLOCK_RE.replace_all(&text, "").into_owned();
    text = REF_SELF_CLOSING_RE.replace_all(&text, "").into_owned();
    text = render_templates(&text);

    text = NAMESPACED_LINK_RE.replace_all(&text, "").into_owned();
    text = PIPED_LINK_RE.replace_all(&text, "$1").into_owned();
    text = LINK_RE.replace_all(&text, "$1").into_owned();

    text = TAG_RE.replace_all(&text, "").into_owned();
    text = EMPHASIS_RE.replace_all(&text, "").into_owned();
    text.retain(|c| c != '<' && c != '>');

    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT_RE.replace_all(&text, "$1");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_templates(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_TEMPLATE_PASSES {
        let next = TEMPLATE_RE
            .replace_all(&current, |caps: &regex::Captures| render_template(&caps[1]))
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
    if current.contains("{{") {
        debug!(passes = MAX_TEMPLATE_PASSES, "template nesting too deep, dropping remainder");
        current = strip_templates(&current);
    }
    current
}

/// Removes every `{{ ... }}` span, balanced by depth.
fn strip_templates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("{{") {
            depth += 1;
            rest = after;
        } else if let (true, Some(after)) = (depth > 0, rest.strip_prefix("}}")) {
            depth -= 1;
            rest = after;
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                if depth == 0 {
                    out.push(c);
                }
            }
            rest = chars.as_str();
        }
    }
    out
}

struct TemplateArgs<'a> {
    name: &'a str,
    positional: Vec<&'a str>,
    named: Vec<(&'a str, &'a str)>,
}

impl<'a> TemplateArgs<'a> {
    fn parse(inner: &'a str) -> Self {
        let mut parts = inner.split('|');
        let name = parts.next().unwrap_or_default().trim();
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for part in parts {
            match part.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() && !key.contains(' ') => {
                    named.push((key.trim(), value.trim()))
                }
                _ => positional.push(part.trim()),
            }
        }
        Self { name, positional, named }
    }

    fn pos(&self, index: usize) -> Option<&'a str> {
        self.positional
            .get(index)
            .copied()
            .filter(|v| !v.is_empty() && *v != "-")
    }

    fn named(&self, keys: &[&str]) -> Option<&'a str> {
        self.named
            .iter()
            .find(|(k, v)| keys.contains(k) && !v.is_empty())
            .map(|(_, v)| *v)
    }
}

fn render_template(inner: &str) -> String {
    let args = TemplateArgs::parse(inner);
    match args.name {
        // {{inh|en|ang|hǣlan|t=to heal}}: target language first, then source.
        "inh" | "inh+" | "der" | "der+" | "bor" | "bor+" | "lbor" | "slbor" | "ubor" | "uder"
        | "calque" | "cal" | "clq" | "learned borrowing" | "inherited" | "derived"
        | "borrowed" => etymon(args.pos(1), args.pos(2), args.pos(3), gloss(&args, 4)),
        // {{cog|de|Haus}}, {{m|la|domus||house}}
        "cog" | "cognate" | "noncog" | "ncog" | "m" | "m+" | "mention" | "l" | "l-self"
        | "link" => etymon(args.pos(0), args.pos(1), args.pos(2), gloss(&args, 3)),
        "etyl" => args.pos(0).map(language_name).unwrap_or_default(),
        "affix" | "af" | "prefix" | "pre" | "suffix" | "suf" | "compound" | "com"
        | "confix" | "con" | "surf" => args
            .positional
            .iter()
            .skip(1)
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" + "),
        "w" | "glossary" => args.pos(1).or(args.pos(0)).unwrap_or_default().to_string(),
        "lang" => args.pos(1).unwrap_or_default().to_string(),
        "gloss" | "gl" => args.pos(0).map(|g| format!("(“{g}”)")).unwrap_or_default(),
        "nowrap" | "smallcaps" | "small" | "q" | "qualifier" | "i" => {
            args.positional.join(", ")
        }
        _ => String::new(),
    }
}

fn gloss<'a>(args: &TemplateArgs<'a>, index: usize) -> Option<&'a str> {
    args.named(&["t", "gloss"]).or_else(|| args.pos(index))
}

fn etymon(lang: Option<&str>, term: Option<&str>, alt: Option<&str>, gloss: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(code) = lang {
        parts.push(language_name(code));
    }
    if let Some(form) = alt.or(term) {
        parts.push(form.to_string());
    }
    if let Some(g) = gloss {
        parts.push(format!("(“{g}”)"));
    }
    parts.join(" ")
}

/// Display name for a Wiktionary language code; unknown codes pass through.
pub fn language_name(code: &str) -> String {
    let name = match code {
        "en" => "English",
        "enm" => "Middle English",
        "ang" => "Old English",
        "la" => "Latin",
        "la-lat" | "LL." => "Late Latin",
        "la-med" | "ML." => "Medieval Latin",
        "la-vul" | "VL." => "Vulgar Latin",
        "grc" => "Ancient Greek",
        "el" => "Greek",
        "fr" => "French",
        "fro" => "Old French",
        "frm" => "Middle French",
        "xno" => "Anglo-Norman",
        "pro" => "Old Occitan",
        "de" => "German",
        "gmh" => "Middle High German",
        "goh" => "Old High German",
        "gml" => "Middle Low German",
        "osx" => "Old Saxon",
        "nl" => "Dutch",
        "dum" => "Middle Dutch",
        "odt" => "Old Dutch",
        "non" => "Old Norse",
        "is" => "Icelandic",
        "sv" => "Swedish",
        "da" => "Danish",
        "no" | "nb" => "Norwegian",
        "got" => "Gothic",
        "gem-pro" => "Proto-Germanic",
        "gmw-pro" => "Proto-West Germanic",
        "ine-pro" => "Proto-Indo-European",
        "itc-pro" => "Proto-Italic",
        "cel-pro" => "Proto-Celtic",
        "sga" => "Old Irish",
        "ga" => "Irish",
        "cy" => "Welsh",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ca" => "Catalan",
        "ro" => "Romanian",
        "ar" => "Arabic",
        "fa" => "Persian",
        "he" => "Hebrew",
        "sa" => "Sanskrit",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "ru" => "Russian",
        "pl" => "Polish",
        "cs" => "Czech",
        "fi" => "Finnish",
        "hu" => "Hungarian",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "ko" => "Korean",
        other => return other.to_string(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_inheritance_chain() {
        let raw = "From {{inh|en|enm|hous}}, from {{inh|en|ang|hūs||dwelling}}.";
        assert_eq!(
            clean_markup(raw),
            "From Middle English hous, from Old English hūs (“dwelling”)."
        );
    }

    #[test]
    fn renders_named_gloss_and_cognates() {
        let raw = "Cognate with {{cog|de|Haus|t=house}} and {{m|la|domus}}.";
        assert_eq!(clean_markup(raw), "Cognate with German Haus (“house”) and Latin domus.");
    }

    #[test]
    fn nested_templates_resolve_inside_out() {
        let raw = "{{nowrap|{{m|la|aqua}}}}";
        assert_eq!(clean_markup(raw), "Latin aqua");
    }

    #[test]
    fn nesting_past_the_pass_limit_is_dropped() {
        let depth = MAX_TEMPLATE_PASSES + 8;
        let nested = format!("{}x{}", "{{m|la|".repeat(depth), "}}".repeat(depth));
        let cleaned = clean_markup(&format!("From {nested} onwards"));
        assert!(!cleaned.contains("{{") && !cleaned.contains("}}"), "{cleaned}");
        assert!(cleaned.starts_with("From"));
        assert!(cleaned.ends_with("onwards"));
    }

    #[test]
    fn unknown_templates_vanish() {
        assert_eq!(clean_markup("{{root|en|ine-pro|*wed-}}Water"), "Water");
    }

    #[test]
    fn links_refs_and_tags_are_stripped() {
        let raw = "See [[house|houses]] and [[home]].<ref name=\"x\">{{cite}}</ref> '''Bold''' <sup>1</sup> a < b";
        assert_eq!(clean_markup(raw), "See houses and home. Bold 1 a b");
    }

    #[test]
    fn unknown_language_codes_pass_through() {
        assert_eq!(language_name("xyz"), "xyz");
        assert_eq!(language_name("ine-pro"), "Proto-Indo-European");
    }
}
