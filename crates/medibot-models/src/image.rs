//! Google Gemini image model implementation.
//!
//! Uses a Gemini model with native image output. The response is walked for
//! the first `inlineData` part across candidates; the base64 payload is
//! decoded to raw bytes at this boundary.

use std::env;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use medibot_abstraction::{ImageModel, ModelError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image model ID; supports native image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Google Gemini image generation model.
#[derive(Debug, Clone)]
pub struct GeminiImageModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl GeminiImageModel {
    /// Creates a new `GeminiImageModel` using the default image model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the API key is not found in environment variables.
    pub fn new() -> Result<Self, ModelError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
            ModelError::UnsupportedModelProvider(
                "GEMINI_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::with_api_key(DEFAULT_IMAGE_MODEL.to_string(), api_key))
    }

    /// Creates a new `GeminiImageModel` with a custom model ID and API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self { model_id, api_key, base_url: DEFAULT_BASE_URL.to_string(), client: Client::new() }
    }

    /// Overrides the API base URL (used by tests against a local server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ImageModel for GeminiImageModel {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            "GeminiImageModel generating image"
        );

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model_id, self.api_key
        );
        let request_body = ImageRequest {
            contents: vec![ImageContent {
                role: "user".to_string(),
                parts: vec![ImagePart { text: Some(prompt.to_string()), inline_data: None }],
            }],
        };

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to Gemini image API");
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini image API returned error status");
            return Err(ModelError::ModelResponseError(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let envelope: ImageResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini image response");
            ModelError::SerializationError(format!("Invalid response body: {}", e))
        })?;

        let Some(encoded) = envelope.first_inline_data() else {
            warn!(model_id = %self.model_id, "No image found in Gemini response");
            return Err(ModelError::EmptyResponse);
        };

        BASE64.decode(encoded.as_bytes()).map_err(|e| {
            ModelError::SerializationError(format!("Invalid base64 image payload: {}", e))
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    contents: Vec<ImageContent>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    role: String,
    parts: Vec<ImagePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ImagePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    candidates: Vec<ImageCandidate>,
}

impl ImageResponse {
    /// First inline-data payload across candidates, in candidate order.
    fn first_inline_data(&self) -> Option<&str> {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .find_map(|p| p.inline_data.as_ref().map(|d| d.data.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct ImageCandidate {
    #[serde(default)]
    content: ImageCandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct ImageCandidateContent {
    #[serde(default)]
    parts: Vec<ImagePart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_inline_data_skips_text_parts() {
        let envelope: ImageResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"here is your image"},
                {"inlineData":{"mimeType":"image/png","data":"aGVsbG8="}}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.first_inline_data(), Some("aGVsbG8="));
    }

    #[test]
    fn test_first_inline_data_none_for_text_only_response() {
        let envelope: ImageResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"cannot draw that"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.first_inline_data(), None);
    }
}
