use sha2::{Digest, Sha256};

const FINGERPRINT_HEX_LEN: usize = 16;

pub const TRANSLATION_KIND: &str = "tr";
pub const ETYMOLOGY_KIND: &str = "etym";

/// Deterministic hash of whitespace-normalized text.
pub fn fingerprint(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}

/// `version:tr:from:to:fingerprint`
pub fn translation_key(version: &str, from: &str, to: &str, text: &str) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        version,
        TRANSLATION_KIND,
        from,
        to,
        fingerprint(text)
    )
}

/// `version:etym:lang:word`
pub fn etymology_key(version: &str, lang: &str, word: &str) -> String {
    format!("{}:{}:{}:{}", version, ETYMOLOGY_KIND, lang, word)
}
