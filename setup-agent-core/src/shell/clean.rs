//! Terminal output cleanup

use regex::Regex;
use std::sync::OnceLock;

const SPINNER_CHARS: &str = "⠏⠋⠙⠹⠸⠼⠴⠦⠧⠇|/-\\";

fn ansi_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").ok())
        .as_ref()
}

fn progress_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,3}\.\d%#+\s*").ok())
        .as_ref()
}

/// Strip ANSI CSI sequences (colors, cursor movement)
pub fn remove_ansi_escapes(text: &str) -> String {
    match ansi_re() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Each `\x08` erases the character before it
pub fn apply_backspaces(text: &str) -> String {
    let mut out: Vec<char> = Vec::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{8}' {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out.into_iter().collect()
}

/// ANSI codes, carriage returns and backspaces removed, then trimmed
pub fn clean_chunk(chunk: &str) -> String {
    let text = remove_ansi_escapes(chunk).replace('\r', "");
    apply_backspaces(&text).trim().to_string()
}

/// Spinner frames and progress bars
pub fn is_progress_noise(chunk: &str) -> bool {
    if progress_re().map_or(false, |re| re.is_match(chunk)) {
        return true;
    }
    !chunk.is_empty() && chunk.trim().chars().all(|c| SPINNER_CHARS.contains(c))
}
