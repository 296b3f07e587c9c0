//! Heuristics that drop likely false positives

use regex::Regex;
use std::sync::OnceLock;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const HEX_UPPER: &str = "0123456789ABCDEFABCDEF";

fn sequences() -> &'static [String] {
    static SEQUENCES: OnceLock<Vec<String>> = OnceLock::new();
    SEQUENCES.get_or_init(|| {
        vec![
            // base64, letters first
            format!("{UPPER}{UPPER}{DIGITS}+/"),
            // base64, digits first
            format!("{DIGITS}{UPPER}{UPPER}+/"),
            format!("{DIGITS}{UPPER}").repeat(2),
            DIGITS.repeat(2),
            HEX_UPPER.repeat(2),
            format!("{UPPER}=/"),
        ]
    })
}

pub fn is_likely_uuid(secret: &str) -> bool {
    static UUID: OnceLock<Option<Regex>> = OnceLock::new();
    UUID.get_or_init(|| {
        Regex::new(r"(?i)[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}").ok()
    })
    .as_ref()
    .map_or(false, |re| re.is_match(secret))
}

/// `${VAR}`, `{var}`, `<VAR>` and one-character values
pub fn is_templated_secret(secret: &str) -> bool {
    if secret.chars().count() < 2 {
        return true;
    }
    (secret.starts_with('{') && secret.ends_with('}'))
        || (secret.starts_with('<') && secret.ends_with('>'))
        || (secret.starts_with("${") && secret.ends_with('}'))
}

/// `abcdef`, `123456`, `ABCDEF0123` and similar runs
pub fn is_sequential_string(secret: &str) -> bool {
    let upper = secret.to_uppercase();
    sequences().iter().any(|s| s.contains(&upper))
}

/// Values without a single ASCII letter, e.g. `*****` or `12:30`
pub fn is_not_alphanumeric(secret: &str) -> bool {
    !secret.chars().any(|c| c.is_ascii_alphabetic())
}

pub fn is_false_positive(secret: &str) -> bool {
    is_likely_uuid(secret)
        || is_templated_secret(secret)
        || is_sequential_string(secret)
        || is_not_alphanumeric(secret)
}
