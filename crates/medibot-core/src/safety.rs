//! Input and output safety checks.
//!
//! Pattern-based prompt-injection detection on the way in, leak/abuse
//! screening on the way out. A blocked turn gets a canned refusal shaped
//! like a normal response; it is never a server error.

use once_cell::sync::Lazy;
use regex::Regex;

/// Inputs longer than this are flagged.
pub const MAX_INPUT_LEN: usize = 4000;

/// Canned refusal for blocked input.
pub const INPUT_REFUSAL: &str = "I'm sorry, but I can't process that request.";

/// Canned refusal for blocked output.
pub const OUTPUT_REFUSAL: &str = "I'm sorry, but I can't provide that response.";

static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)ignore\s+(all\s+|any\s+)?(previous|prior|above)\s+instructions",
        r"(?i)disregard\s+(all\s+|any\s+)?(previous|prior|your)\s+(instructions|rules)",
        r"(?i)you\s+are\s+now\s+(a|an)\s+",
        r"(?i)pretend\s+(to\s+be|you\s+are)",
        r"(?i)(reveal|show|print|repeat)\s+(me\s+)?your\s+(system\s+)?prompt",
        r"(?i)\bdan\s+mode\b",
        r"(?i)\bjailbreak\b",
        r"(?i)act\s+as\s+(if\s+you\s+have\s+)?no\s+(restrictions|rules|guidelines)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("injection pattern"))
    .collect()
});

static OUTPUT_LEAK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)my\s+system\s+prompt\s+(is|says)",
        r"(?i)here\s+(is|are)\s+my\s+(full\s+)?instructions",
        r"(?i)<script\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("output pattern"))
    .collect()
});

/// How severe the detected issues are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLevel {
    /// No issues detected.
    Safe,
    /// Suspicious but allowed through.
    Warning,
    /// Refused for this turn.
    Blocked,
}

/// The result of a safety scan.
#[derive(Debug, Clone)]
pub struct SafetyCheck {
    /// Severity of the findings.
    pub level: SafetyLevel,
    /// Whether the text may proceed.
    pub passed: bool,
    /// Human-readable descriptions of each finding.
    pub issues: Vec<String>,
}

/// Scans a query for prompt-injection attempts.
///
/// One matched pattern downgrades to a warning; two or more block the turn.
/// Excessive length is counted as a finding.
#[must_use]
pub fn detect_prompt_injection(query: &str) -> SafetyCheck {
    let mut issues = Vec::new();

    for pattern in INJECTION_PATTERNS.iter() {
        if let Some(found) = pattern.find(query) {
            issues.push(format!("injection pattern matched: {:?}", found.as_str()));
        }
    }

    if query.chars().count() > MAX_INPUT_LEN {
        issues.push(format!("input exceeds maximum length of {MAX_INPUT_LEN}"));
    }

    let level = match issues.len() {
        0 => SafetyLevel::Safe,
        1 => SafetyLevel::Warning,
        _ => SafetyLevel::Blocked,
    };

    SafetyCheck { level, passed: level != SafetyLevel::Blocked, issues }
}

/// Scans a model answer for instruction leakage or embedded markup.
#[must_use]
pub fn validate_output(response: &str) -> SafetyCheck {
    let issues: Vec<String> = OUTPUT_LEAK_PATTERNS
        .iter()
        .filter_map(|p| p.find(response))
        .map(|m| format!("output pattern matched: {:?}", m.as_str()))
        .collect();

    let level = if issues.is_empty() { SafetyLevel::Safe } else { SafetyLevel::Blocked };
    SafetyCheck { level, passed: level != SafetyLevel::Blocked, issues }
}

/// Strips control characters and clamps overlong input.
#[must_use]
pub fn sanitize_input(query: &str) -> String {
    let cleaned: String =
        query.chars().filter(|c| !c.is_control() || *c == '\n' || *c == '\t').collect();
    cleaned.trim().chars().take(MAX_INPUT_LEN).collect()
}

/// Checks a query before it reaches the model.
///
/// Returns `(safe, sanitized_query, refusal)`: when blocked, `safe` is false
/// and `refusal` carries the canned reply to return instead of an answer.
#[must_use]
pub fn check_input_safety(query: &str) -> (bool, String, Option<String>) {
    let check = detect_prompt_injection(query);
    if !check.passed {
        return (false, query.to_string(), Some(INPUT_REFUSAL.to_string()));
    }
    (true, sanitize_input(query), None)
}

/// Checks a model answer before it reaches the user.
#[must_use]
pub fn check_output_safety(response: &str) -> (bool, String, Option<String>) {
    let check = validate_output(response);
    if !check.passed {
        return (false, response.to_string(), Some(OUTPUT_REFUSAL.to_string()));
    }
    (true, response.to_string(), None)
}
