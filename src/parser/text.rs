use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// Lines shorter than this (in characters) are navigation or formatting debris.
pub const MIN_LINE_CHARS: usize = 10;

/// Boilerplate that shows up on nearly every 8-K cover page or EDGAR wrapper.
const NOISE_PATTERNS: &[&str] = &[
    r"SEC\.gov",
    r"EDGAR",
    r"Filing Detail",
    r"Document Format Files",
    r"Complete submission text file",
    r"XBRL.*DOCUMENT",
    r"Washington.*D\.?C\.?\s*20549",
    r"Securities and Exchange Commission",
    r"Form\s+8-K",
    r"Current Report",
    r"Commission File Number",
    r"Check the appropriate box",
    r"☐|☑|□|■",
];

static NOISE_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(NOISE_PATTERNS.iter().map(|p| format!("(?i){}", p))).unwrap()
});
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\s\-_=*\.]+$").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static HSPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t\p{Zs}]+").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Line-level cleanup of flattened document text.
///
/// Each line is trimmed and its horizontal whitespace collapsed before the
/// filters run, so the length floor holds for the text that is returned.
pub fn clean_text(text: &str) -> String {
    let kept: Vec<String> = text
        .lines()
        .map(normalize_line)
        .filter(|line| keep_line(line))
        .collect();

    let joined = kept.join("\n");
    let joined = BLANKS_RE.replace_all(&joined, "\n\n");
    let joined = HSPACE_RE.replace_all(&joined, " ");
    joined.trim().to_string()
}

fn normalize_line(line: &str) -> String {
    HSPACE_RE.replace_all(line.trim(), " ").into_owned()
}

fn keep_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if SEPARATOR_RE.is_match(line) || DIGITS_RE.is_match(line) {
        return false;
    }
    if line.chars().count() < MIN_LINE_CHARS {
        return false;
    }
    !is_noise(line)
}

/// True when the line matches any boilerplate pattern (case-insensitive).
pub fn is_noise(line: &str) -> bool {
    NOISE_SET.is_match(line)
}

// ── Tests ──
