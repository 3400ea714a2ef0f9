use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Confidence attached to every parsed result; the model gives no usable signal.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

static PRIMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Event Type:\s*([^,]+),\s*Relevant:\s*(true|false)").unwrap()
});

/// Tried in this order, only when the primary pattern finds nothing.
static FALLBACK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)([^:]+):\s*(true|false|yes|no)",
        r"(?i)Type:\s*([^,]+),\s*Relevant:\s*(true|false)",
        r"(?i)Classification:\s*([^,]+),\s*Significant:\s*(true|false)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:reasoning|because|explanation):").unwrap());

/// Headings that close a reasoning block.
const SECTION_ENDS: &[&str] = &["classification:", "validation:", "event type:"];

/// A validated classification of one filing.
///
/// Only built after the category has been resolved against the configured
/// set, so `event_type` is always one of the canonical category names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub event_type: String,
    pub relevant: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub raw_response: String,
}

/// Parse free-form model output into a classification.
///
/// `valid_names` is the configured category set in its iteration order; that
/// order decides ties in the substring fallback. Returns `None` when no
/// pattern matches or the captured category resolves to nothing.
pub fn parse_response(raw: &str, valid_names: &[&str]) -> Option<ClassificationResult> {
    let caps = PRIMARY_RE
        .captures(raw)
        .or_else(|| FALLBACK_RES.iter().find_map(|re| re.captures(raw)))?;

    let captured = caps.get(1)?.as_str().trim();
    let flag = caps.get(2)?.as_str();

    let event_type = resolve_category(captured, valid_names)?;

    Some(ClassificationResult {
        event_type: event_type.to_string(),
        relevant: parse_flag(flag),
        confidence: DEFAULT_CONFIDENCE,
        reasoning: extract_reasoning(raw),
        raw_response: raw.to_string(),
    })
}

/// Case-insensitive exact match first, then containment in either direction.
///
/// The containment step takes the first hit in `valid_names` order, so names
/// that nest ("Event" inside "Customer Event") can resolve to the wrong one.
pub fn resolve_category<'a>(captured: &str, valid_names: &[&'a str]) -> Option<&'a str> {
    if captured.is_empty() {
        return None;
    }
    let needle = captured.to_lowercase();

    if let Some(exact) = valid_names.iter().find(|name| name.to_lowercase() == needle) {
        return Some(*exact);
    }

    valid_names
        .iter()
        .find(|name| {
            let name = name.to_lowercase();
            needle.contains(&name) || name.contains(&needle)
        })
        .copied()
}

fn parse_flag(token: &str) -> bool {
    matches!(token.trim().to_lowercase().as_str(), "true" | "yes" | "1")
}

/// Best-effort rationale: the block following the first `reasoning:`,
/// `because:` or `explanation:` marker, up to the classification heading.
pub fn extract_reasoning(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();

    let Some((start, rest)) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| REASONING_RE.find(line).map(|m| (i, &line[m.end()..])))
    else {
        return String::new();
    };

    let mut block = vec![rest.trim()];
    for line in &lines[start + 1..] {
        let lower = line.trim_start().to_lowercase();
        if SECTION_ENDS.iter().any(|end| lower.starts_with(end)) {
            break;
        }
        block.push(line.trim());
    }

    block.join("\n").trim().to_string()
}

// ── Tests ──
