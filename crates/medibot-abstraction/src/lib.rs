//! Provider abstraction layer for MediBot.
//!
//! This crate defines the traits and types at the boundary between the chat
//! backend and its remote collaborators: the text model, the image model,
//! blob storage, and the key-value store.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when interacting with an AI model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, rate limiting).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider is not supported or configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// The response contained no usable content (empty candidates, no parts).
    #[error("Empty Model Response")]
    EmptyResponse,

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// An error raised by a storage collaborator (blob store or key-value store).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A stored payload could not be serialized or deserialized.
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

/// Parameters for controlling the model's generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    /// What sampling temperature to use, between 0 and 2.
    /// Higher values mean the model will take more risks.
    pub temperature: Option<f32>,

    /// The maximum number of tokens to generate in the completion.
    pub max_tokens: Option<u32>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self { temperature: Some(0.7), max_tokens: Some(1536) }
    }
}

/// The normalized response from a text completion model.
///
/// Provider envelopes vary; each implementation flattens its own wire format
/// into this type immediately after the call, so nothing downstream ever
/// inspects provider-specific shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAnswer {
    /// The generated content.
    pub content: String,

    /// The ID of the model that produced the response.
    pub model_id: Option<String>,

    /// Optional usage statistics for the request.
    pub usage: Option<ModelUsage>,
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

/// A boxed stream of text chunks from a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// A trait for text completion models.
///
/// All models must be `Send + Sync` to allow concurrent use across tasks.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generates a text completion based on the given prompt.
    ///
    /// # Arguments
    /// * `prompt` - The input prompt for text generation
    /// * `parameters` - Optional parameters to control generation
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelAnswer, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}

/// A trait for models that can stream completions chunk by chunk.
#[async_trait]
pub trait StreamingModel: Model {
    /// Streams a text completion, yielding chunks as they arrive.
    ///
    /// # Errors
    /// Returns a `ModelError` if the stream cannot be opened; per-chunk
    /// failures surface as `Err` items in the stream.
    async fn stream_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<TextStream, ModelError>;
}

/// A trait for image generation models.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generates a single image for the given prompt.
    ///
    /// # Returns
    /// Raw image bytes (PNG) on success.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails or the response contains
    /// no image data.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ModelError>;

    /// Returns the ID of the image model.
    fn model_id(&self) -> &str;
}

/// A trait for blob storage (generated step images).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes an object under the given key.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Produces a time-limited retrieval URL for the given key.
    async fn presign(&self, key: &str, ttl_seconds: u64) -> Result<String, StoreError>;
}

/// A trait for key-value storage (response cache, chat records).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetches the JSON item stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Writes `item` under `key`, overwriting any previous value.
    async fn put(&self, key: &str, item: serde_json::Value) -> Result<(), StoreError>;
}
