//! Treatment step extraction from free-text model answers.
//!
//! The model is prompted to number steps explicitly (`**Step 1: Title**`),
//! but its output drifts; the parser tolerates optional emphasis markers and
//! falls back to plain numbered-list markers when no step headers are found.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Step descriptions are truncated to this many characters.
pub const MAX_DESCRIPTION_LEN: usize = 300;

/// Numbered-list fallback stops after this many items.
const FALLBACK_STEP_CAP: usize = 10;

/// Fallback items shorter than this are treated as noise.
const FALLBACK_MIN_ITEM_LEN: usize = 10;

static STEP_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*?\*?Step\s*(\d+)[:\s]*\*?\*?\s*\[?([^\]\n]+)\]?\*?\*?")
        .expect("step header regex")
});

/// Start of the next top-level section after the last step, e.g. a bold
/// `**Warnings**` header. Anything beginning with "S" is assumed to be
/// another step header and is handled by the primary pattern instead.
static NEXT_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\*\*[^S]").expect("section regex"));

static NUMBERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d+)[.)]\s+(.+)$").expect("numbered item regex"));

/// One discrete instruction unit parsed from a treatment answer.
///
/// Immutable once created; the step number is kept as a string to preserve
/// whatever formatting the source text used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentStep {
    /// The step number as written in the source text.
    pub step_number: String,
    /// The step title.
    pub title: String,
    /// The step body, truncated to [`MAX_DESCRIPTION_LEN`] characters.
    pub description: String,
}

/// Parses a model answer into an ordered list of treatment steps.
///
/// Scans for `Step <N>` headers; each step's description runs from the end
/// of its header to the start of the next one, or for the last step, to the
/// next top-level section (or end of text). If no headers are found, a
/// best-effort fallback interprets leading numbered-list markers as steps.
#[must_use]
pub fn extract_treatment_steps(answer_text: &str) -> Vec<TreatmentStep> {
    let matches: Vec<_> = STEP_HEADER.captures_iter(answer_text).collect();
    if matches.is_empty() {
        return extract_numbered_fallback(answer_text);
    }

    let mut steps = Vec::with_capacity(matches.len());
    for (i, caps) in matches.iter().enumerate() {
        let step_number = caps[1].to_string();
        let title = caps[2].trim().trim_matches(|c| c == '*' || c == '[' || c == ']').to_string();

        let start = caps.get(0).map_or(0, |m| m.end());
        let end = if let Some(next) = matches.get(i + 1) {
            next.get(0).map_or(answer_text.len(), |m| m.start())
        } else {
            NEXT_SECTION
                .find(&answer_text[start..])
                .map_or(answer_text.len(), |m| start + m.start())
        };

        let description = strip_leading_emphasis(answer_text[start..end].trim());
        steps.push(TreatmentStep { step_number, title, description: truncate(&description) });
    }

    steps
}

/// Secondary heuristic for answers without `Step N` headers: leading
/// `1.`/`1)` list markers become steps. Best-effort only.
fn extract_numbered_fallback(answer_text: &str) -> Vec<TreatmentStep> {
    NUMBERED_ITEM
        .captures_iter(answer_text)
        .filter_map(|caps| {
            let text = caps[2].trim().to_string();
            if text.chars().count() < FALLBACK_MIN_ITEM_LEN {
                return None;
            }
            Some(TreatmentStep {
                step_number: caps[1].to_string(),
                title: truncate_to(&text, 60),
                description: truncate(&text),
            })
        })
        .take(FALLBACK_STEP_CAP)
        .collect()
}

fn strip_leading_emphasis(text: &str) -> String {
    text.trim_start_matches('*').trim_start().to_string()
}

fn truncate(text: &str) -> String {
    truncate_to(text, MAX_DESCRIPTION_LEN)
}

fn truncate_to(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_two_bold_steps() {
        let steps =
            extract_treatment_steps("**Step 1: Clean**\nWash.\n**Step 2: Cover**\nBandage.");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, "1");
        assert_eq!(steps[0].title, "Clean");
        assert_eq!(steps[0].description, "Wash.");
        assert_eq!(steps[1].step_number, "2");
        assert_eq!(steps[1].title, "Cover");
        assert_eq!(steps[1].description, "Bandage.");
    }

    #[test]
    fn test_last_step_stops_at_next_section() {
        let text = "**Step 1: Press**\nApply firm pressure.\n\n**⚠️ Warnings**\nSeek help.";
        let steps = extract_treatment_steps(text);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].description, "Apply firm pressure.");
        assert!(!steps[0].description.contains("Seek help"));
    }

    #[test]
    fn test_plain_headers_without_emphasis() {
        let steps = extract_treatment_steps("Step 1: Rinse\nUse cool water.\nStep 2: Dry\nPat dry.");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].title, "Rinse");
        assert_eq!(steps[1].description, "Pat dry.");
    }

    #[test]
    fn test_case_insensitive_headers() {
        let steps = extract_treatment_steps("STEP 1: Shout for help\nCall emergency services.");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].title, "Shout for help");
    }

    #[test]
    fn test_description_truncated_to_300_chars() {
        let long = "x".repeat(500);
        let steps = extract_treatment_steps(&format!("**Step 1: Long**\n{long}"));
        assert_eq!(steps[0].description.chars().count(), MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn test_numbered_list_fallback() {
        let text = "Do the following:\n1. Rinse the wound with clean water\n2) Apply a sterile bandage firmly\n3. ok\n";
        let steps = extract_treatment_steps(text);
        assert_eq!(steps.len(), 2); // the 2-char item is filtered out
        assert_eq!(steps[0].step_number, "1");
        assert!(steps[0].description.starts_with("Rinse"));
        assert_eq!(steps[1].step_number, "2");
    }

    #[test]
    fn test_fallback_caps_at_ten() {
        let mut text = String::new();
        for i in 1..=15 {
            text.push_str(&format!("{i}. A reasonably long instruction line\n"));
        }
        assert_eq!(extract_treatment_steps(&text).len(), 10);
    }

    #[test]
    fn test_no_steps_in_prose() {
        let steps = extract_treatment_steps("Rest, hydrate, and monitor your temperature.");
        assert!(steps.is_empty());
    }
}
