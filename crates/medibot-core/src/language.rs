//! Language detection and the translation seam.
//!
//! Detection is a script-range heuristic over the supported set (English,
//! Telugu, Hindi). Translation itself is an external collaborator behind the
//! `Translator` trait; a passthrough implementation ships for tests and
//! deployments without a translation backend.

use async_trait::async_trait;
use medibot_abstraction::ModelError;

/// Supported languages as (name, code) pairs.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] =
    &[("English", "en"), ("Telugu", "te"), ("Hindi", "hi")];

/// Detects the language of input text by Unicode script ranges.
///
/// Telugu is U+0C00..=U+0C7F, Devanagari U+0900..=U+097F; anything else is
/// treated as English.
#[must_use]
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0C00}'..='\u{0C7F}').contains(&c)) {
        return "te";
    }
    if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        return "hi";
    }
    "en"
}

/// Maps a language name to its code; unknown names default to "en".
#[must_use]
pub fn language_code(name: &str) -> &'static str {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map_or("en", |(_, code)| code)
}

/// Translation collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` from `source_lang` into English.
    async fn to_english(&self, text: &str, source_lang: &str) -> Result<String, ModelError>;

    /// Translates English `text` into `target_lang`.
    async fn from_english(&self, text: &str, target_lang: &str) -> Result<String, ModelError>;
}

/// Passthrough translator for tests and English-only deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn to_english(&self, text: &str, _source_lang: &str) -> Result<String, ModelError> {
        Ok(text.to_string())
    }

    async fn from_english(&self, text: &str, _target_lang: &str) -> Result<String, ModelError> {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_telugu() {
        assert_eq!(detect_language("నాకు జ్వరం వచ్చింది"), "te");
    }

    #[test]
    fn test_detects_hindi() {
        assert_eq!(detect_language("मुझे बुखार है"), "hi");
    }

    #[test]
    fn test_defaults_to_english() {
        assert_eq!(detect_language("I have a fever"), "en");
        assert_eq!(detect_language(""), "en");
    }

    #[test]
    fn test_language_code_lookup() {
        assert_eq!(language_code("Telugu"), "te");
        assert_eq!(language_code("english"), "en");
        assert_eq!(language_code("Klingon"), "en");
    }
}
