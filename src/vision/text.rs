use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::document::OcrMode;

static DIGIT_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static EMAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

/// Standalone digit tokens for legacy ID extraction, longest tier first,
/// paired with the zero padding that restores a 9-digit ID.
static LEGACY_TIERS: LazyLock<[(Regex, &str); 4]> = LazyLock::new(|| {
    [
        (Regex::new(r"\b(\d{9})\b").unwrap(), ""),
        (Regex::new(r"\b(\d{8})\b").unwrap(), "0"),
        (Regex::new(r"\b(\d{7})\b").unwrap(), "00"),
        (Regex::new(r"\b(\d{6})\b").unwrap(), "000"),
    ]
});

/// Result of post-processing recognized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A single extracted string (all_text and legacy modes).
    Text(String),
    /// An ordered list of matches (numbers, email, custom modes).
    Matches(Vec<String>),
}

impl Extraction {
    /// First element for clipboard-copy processing.
    pub fn first(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Matches(m) => m.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Space-joined concatenation of all elements.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Matches(m) => m.join(" "),
        }
    }
}

impl std::fmt::Display for Extraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Matches(m) => write!(f, "[{}]", m.join(", ")),
        }
    }
}

/// Post-process raw recognizer output according to the selected mode.
///
/// Returns `None` when the text is empty or nothing matched. An invalid
/// custom pattern is logged and swallowed, never raised.
pub fn extract(text: &str, mode: &OcrMode, pattern: &str) -> Option<Extraction> {
    if text.is_empty() {
        return None;
    }

    match mode {
        OcrMode::AllText => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Extraction::Text(trimmed.to_string()))
            }
        }

        OcrMode::Numbers => {
            let numbers: Vec<String> = DIGIT_RUNS
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect();
            if numbers.is_empty() {
                None
            } else {
                Some(Extraction::Matches(numbers))
            }
        }

        OcrMode::Email => {
            let emails: Vec<String> = EMAILS
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect();
            if emails.is_empty() {
                None
            } else {
                Some(Extraction::Matches(emails))
            }
        }

        OcrMode::Custom => {
            if pattern.is_empty() {
                return None;
            }
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(err) => {
                    warn!(target: "macrobot::vision", %pattern, error = %err, "Invalid custom regex pattern");
                    return None;
                }
            };
            let matches: Vec<String> = re
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect();
            if matches.is_empty() {
                None
            } else {
                Some(Extraction::Matches(matches))
            }
        }

        // Historical ID grab: a standalone 9-digit token, else shorter
        // tokens left-padded with zeros, longest tier first.
        OcrMode::Legacy => {
            for (re, padding) in LEGACY_TIERS.iter() {
                if let Some(caps) = re.captures(text) {
                    return Some(Extraction::Text(format!("{padding}{}", &caps[1])));
                }
            }
            None
        }

        OcrMode::Other(unknown) => {
            warn!(target: "macrobot::vision", mode = %unknown, "Unknown OCR extraction mode");
            None
        }
    }
}
