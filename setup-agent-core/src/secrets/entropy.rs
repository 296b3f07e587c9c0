//! Shannon-entropy detection of random-looking strings

use regex::Regex;
use setup_agent_error::{Error, Result};

use super::plugins::Detector;

const BASE64_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/-_=";
const HEX_CHARSET: &str = "0123456789abcdefABCDEF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Base64,
    Hex,
}

/// Flags strings drawn from one charset whose entropy exceeds a limit.
///
/// Quoted strings are preferred. When a line has none, bare runs of the
/// charset are considered instead, which suits command output and
/// `key=value` values.
#[derive(Debug, Clone)]
pub struct HighEntropyDetector {
    charset: Charset,
    limit: f64,
    quoted: Regex,
    bare: Regex,
}

impl HighEntropyDetector {
    fn new(charset: Charset, limit: f64) -> Result<Self> {
        if !(0.0..=8.0).contains(&limit) {
            return Err(Error::config_invalid(
                "the entropy limit must be between 0.0 and 8.0",
            )
            .with_operation("entropy::new")
            .with_context("limit", limit.to_string()));
        }

        let class = match charset {
            Charset::Base64 => r"A-Za-z0-9+/\-_=",
            Charset::Hex => r"0-9a-fA-F",
        };
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| {
                Error::unexpected("invalid entropy pattern")
                    .with_operation("entropy::new")
                    .set_source(e)
            })
        };

        Ok(Self {
            charset,
            limit,
            quoted: compile(format!(r#""([{c}]+)"|'([{c}]+)'"#, c = class))?,
            bare: compile(format!("[{}]+", class))?,
        })
    }

    pub fn base64(limit: f64) -> Result<Self> {
        Self::new(Charset::Base64, limit)
    }

    pub fn hex(limit: f64) -> Result<Self> {
        Self::new(Charset::Hex, limit)
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn shannon_entropy(&self, data: &str) -> f64 {
        let len = data.chars().count();
        if len == 0 {
            return 0.0;
        }

        let charset = match self.charset {
            Charset::Base64 => BASE64_CHARSET,
            Charset::Hex => HEX_CHARSET,
        };
        let mut entropy = 0.0;
        for c in charset.chars() {
            let p = data.chars().filter(|x| *x == c).count() as f64 / len as f64;
            if p > 0.0 {
                entropy -= p * p.log2();
            }
        }

        // Digit-only hex strings are mostly ids and timestamps
        if self.charset == Charset::Hex && len > 1 && data.chars().all(|c| c.is_ascii_digit()) {
            entropy -= 1.2 / (len as f64).log2();
        }
        entropy
    }

    fn candidates<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let quoted: Vec<&str> = self
            .quoted
            .captures_iter(line)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str())
            .collect();
        if !quoted.is_empty() {
            return quoted;
        }
        self.bare.find_iter(line).map(|m| m.as_str()).collect()
    }
}

impl Detector for HighEntropyDetector {
    fn name(&self) -> &str {
        match self.charset {
            Charset::Base64 => "Base64 High Entropy String",
            Charset::Hex => "Hex High Entropy String",
        }
    }

    fn find(&self, line: &str) -> Vec<String> {
        self.candidates(line)
            .into_iter()
            .filter(|s| self.shannon_entropy(s) > self.limit)
            .map(str::to_string)
            .collect()
    }
}
