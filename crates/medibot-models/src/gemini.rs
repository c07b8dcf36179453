//! Google Gemini text model implementation.
//!
//! This module provides an implementation of the `Model` and `StreamingModel`
//! traits for Google's Gemini API. The wire envelope is normalized into a
//! `ModelAnswer` immediately after the call; nothing downstream sees
//! provider-specific shapes.

use std::env;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::Stream;
use medibot_abstraction::{
    Model, ModelAnswer, ModelError, ModelParameters, ModelUsage, StreamingModel, TextStream,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini text model.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    /// The model ID (e.g., "gemini-2.5-pro", "gemini-2.5-flash").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl GeminiModel {
    /// Creates a new `GeminiModel` with the given model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the API key is not found in environment variables.
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
            ModelError::UnsupportedModelProvider(
                "GEMINI_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `GeminiModel` with a custom API key.
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

    fn build_request(prompt: &str, parameters: Option<ModelParameters>) -> GeminiRequest {
        let generation_config = parameters.map(|params| GeminiGenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        });

        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
            generation_config,
        }
    }

    /// Maps a non-success HTTP status plus body into a `ModelError`.
    fn error_for_status(status: reqwest::StatusCode, body: &str) -> ModelError {
        if status == 401 || status == 403 {
            return ModelError::UnsupportedModelProvider(format!(
                "Authentication failed ({}): {}",
                status, body
            ));
        }
        if status.is_server_error() {
            return ModelError::ModelResponseError(format!("Server error ({}): {}", status, body));
        }
        ModelError::ModelResponseError(format!("API error ({}): {}", status, body))
    }
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelAnswer, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            "GeminiModel generating text"
        );

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model_id, self.api_key
        );
        let request_body = Self::build_request(prompt, parameters);

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to Gemini API");
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(Self::error_for_status(status, &error_text));
        }

        let envelope: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini response");
            ModelError::SerializationError(format!("Invalid response body: {}", e))
        })?;

        // Normalize the envelope once, right here at the boundary.
        let content = envelope.first_text().ok_or_else(|| {
            warn!(model_id = %self.model_id, "Gemini response contained no text parts");
            ModelError::EmptyResponse
        })?;

        let usage = envelope.usage_metadata.map(|u| ModelUsage {
            prompt_tokens: u.prompt_token_count.unwrap_or(0),
            completion_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count.unwrap_or(0),
        });

        Ok(ModelAnswer { content, model_id: Some(self.model_id.clone()), usage })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl StreamingModel for GeminiModel {
    async fn stream_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<TextStream, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            "GeminiModel opening streaming completion"
        );

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model_id, self.api_key
        );
        let request_body = Self::build_request(prompt, parameters);

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, "Failed to send streaming request to Gemini API");
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini streaming request failed");
            return Err(Self::error_for_status(status, &error_text));
        }

        Ok(Box::pin(GeminiSseStream::new(response)))
    }
}

/// SSE chunk parser for the Gemini streaming format.
///
/// Yields each text delta as it arrives; malformed chunks are skipped.
struct GeminiSseStream {
    stream: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    done: bool,
}

impl GeminiSseStream {
    fn new(response: reqwest::Response) -> Self {
        Self { stream: Box::pin(response.bytes_stream()), buffer: String::new(), done: false }
    }

    /// Pops the next complete SSE event's text delta out of the buffer, if any.
    fn next_delta(&mut self) -> Option<String> {
        while let Some(end_idx) = self.buffer.find("\n\n") {
            let event = self.buffer[..end_idx].to_string();
            self.buffer.drain(..end_idx + 2);

            let Some(data) = event.strip_prefix("data: ") else { continue };
            if data.trim() == "[DONE]" || data.trim().is_empty() {
                self.done = true;
                return None;
            }

            match serde_json::from_str::<GeminiResponse>(data) {
                Ok(chunk) => {
                    if let Some(text) = chunk.first_text() {
                        return Some(text);
                    }
                }
                Err(e) => {
                    // Some servers interleave empty keep-alive chunks.
                    debug!(error = %e, "Skipping malformed SSE chunk");
                }
            }
        }
        None
    }
}

impl Stream for GeminiSseStream {
    type Item = Result<String, ModelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(delta) = self.next_delta() {
                return Poll::Ready(Some(Ok(delta)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(chunk) => self.buffer.push_str(&chunk),
                    Err(e) => {
                        return Poll::Ready(Some(Err(ModelError::SerializationError(format!(
                            "Failed to decode SSE chunk: {}",
                            e
                        )))));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ModelError::RequestError(format!(
                        "Stream error: {}",
                        e
                    )))));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    // Flush whatever complete events remain in the buffer.
                    if let Some(delta) = self.next_delta() {
                        return Poll::Ready(Some(Ok(delta)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxOutputTokens")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

impl GeminiResponse {
    /// Extracts the first non-empty text part across candidates.
    fn first_text(&self) -> Option<String> {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .find(|p| !p.text.is_empty())
            .map(|p| p.text.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiCandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u32>,
}
