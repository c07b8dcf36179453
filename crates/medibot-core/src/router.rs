//! Query-complexity model routing.
//!
//! Simple queries (greetings, basic FAQ) go to the fast model; complex
//! medical queries go to the thorough default model.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::config::ChatConfig;

static GREETING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(hi|hello|hey|good\s*(morning|afternoon|evening)|thanks|thank\s*you|bye|goodbye|ok|okay|what can you do|who are you|help me|start)[\s!?.]*$",
    )
    .expect("greeting pattern")
});

/// Keywords that warrant the thorough model.
const COMPLEX_KEYWORDS: &[&str] = &[
    "treatment plan",
    "differential diagnosis",
    "drug interaction",
    "contraindication",
    "chronic",
    "surgery",
    "anesthesia",
    "emergency",
    "overdose",
    "cardiac arrest",
    "stroke",
    "pregnancy complication",
    "pediatric",
    "cancer",
    "multiple symptoms",
    "blood test",
    "mri",
    "ct scan",
    "report",
    "analyze",
    "interpret",
    "prescription",
];

/// Coarse complexity classification for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    /// Answerable concisely by the fast model.
    Simple,
    /// Warrants the thorough default model.
    Complex,
}

/// Classifies a query as simple or complex.
///
/// Attachments always force complex; short queries and greetings are simple;
/// complex keywords, three or more sentences, or forty or more words are
/// complex; everything else defaults to simple.
#[must_use]
pub fn classify_query_complexity(query: &str, has_attachments: bool) -> QueryComplexity {
    if has_attachments {
        return QueryComplexity::Complex;
    }

    let trimmed = query.trim();
    if trimmed.chars().count() < 15 || GREETING_PATTERN.is_match(trimmed) {
        return QueryComplexity::Simple;
    }

    let lowered = trimmed.to_lowercase();
    if COMPLEX_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return QueryComplexity::Complex;
    }

    let sentence_count = trimmed.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count();
    let word_count = trimmed.split_whitespace().count();
    if sentence_count >= 3 || word_count >= 40 {
        return QueryComplexity::Complex;
    }

    QueryComplexity::Simple
}

/// Selects the model ID for a query.
#[must_use]
pub fn model_for_query<'a>(
    config: &'a ChatConfig,
    query: &str,
    has_attachments: bool,
) -> &'a str {
    match classify_query_complexity(query, has_attachments) {
        QueryComplexity::Simple => {
            info!(model = %config.fast_model_id, reason = "simple_query", "Model router: FAST");
            &config.fast_model_id
        }
        QueryComplexity::Complex => {
            info!(model = %config.default_model_id, reason = "complex_query", "Model router: PRO");
            &config.default_model_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings_are_simple() {
        assert_eq!(classify_query_complexity("Hello!", false), QueryComplexity::Simple);
        assert_eq!(classify_query_complexity("thank you so much!!", false), QueryComplexity::Simple);
        assert_eq!(classify_query_complexity("good morning", false), QueryComplexity::Simple);
    }

    #[test]
    fn test_short_queries_are_simple() {
        assert_eq!(classify_query_complexity("fever?", false), QueryComplexity::Simple);
    }

    #[test]
    fn test_complex_keywords_route_to_pro() {
        assert_eq!(
            classify_query_complexity("What should I do during a cardiac arrest?", false),
            QueryComplexity::Complex
        );
        assert_eq!(
            classify_query_complexity("Is there a drug interaction between these?", false),
            QueryComplexity::Complex
        );
    }

    #[test]
    fn test_attachments_force_complex() {
        assert_eq!(classify_query_complexity("hi", true), QueryComplexity::Complex);
    }

    #[test]
    fn test_long_multi_sentence_queries_are_complex() {
        let query = "I fell off my bike yesterday. My wrist is swollen and bruised. It hurts when I rotate it.";
        assert_eq!(classify_query_complexity(query, false), QueryComplexity::Complex);
    }

    #[test]
    fn test_plain_medium_query_is_simple() {
        assert_eq!(
            classify_query_complexity("how to treat a small cut", false),
            QueryComplexity::Simple
        );
    }

    #[test]
    fn test_model_for_query_uses_config_ids() {
        let config = ChatConfig::default();
        assert_eq!(model_for_query(&config, "hi", false), config.fast_model_id);
        assert_eq!(
            model_for_query(&config, "possible stroke symptoms in my father", false),
            config.default_model_id
        );
    }
}
