//! Provider implementations for MediBot.
//!
//! This crate provides concrete implementations of the abstraction traits.
//!
//! # Supported Providers
//!
//! - **Mock**: Testing and offline development
//! - **Gemini**: Google's Gemini models for text and native image output
//!   (API key required)
//!
//! Storage collaborators ship as in-memory implementations; production
//! deployments front managed services behind the same traits.

pub mod factory;
pub mod gemini;
pub mod image;
pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use medibot_abstraction::{ImageModel, Model, ModelAnswer, ModelError, ModelParameters, ModelUsage};
use tracing::debug;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use gemini::GeminiModel;
pub use image::{DEFAULT_IMAGE_MODEL, GeminiImageModel};
pub use memory::{MemoryKeyValueStore, MemoryObjectStore};

/// A mock implementation of the `Model` trait for testing and demonstration.
///
/// By default it echoes the prompt; tests can script a canned reply or force
/// every call to fail.
#[derive(Debug, Default)]
pub struct MockModel {
    id: String,
    canned: Option<String>,
    fail: AtomicBool,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self { id, canned: None, fail: AtomicBool::new(false) }
    }

    /// Creates a `MockModel` that always returns the given reply.
    #[must_use]
    pub fn with_reply(id: String, reply: String) -> Self {
        Self { id, canned: Some(reply), fail: AtomicBool::new(false) }
    }

    /// Creates a `MockModel` whose calls always fail.
    #[must_use]
    pub fn failing(id: String) -> Self {
        Self { id, canned: None, fail: AtomicBool::new(true) }
    }

    /// Toggles failure mode at runtime.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelAnswer, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "MockModel generating text"
        );

        if self.fail.load(Ordering::SeqCst) {
            return Err(ModelError::ModelResponseError("mock failure".to_string()));
        }

        let content = self
            .canned
            .clone()
            .unwrap_or_else(|| format!("Mock response for: {prompt}\nModel ID: {}", self.id));

        let prompt_tokens = count_tokens(prompt);
        let completion_tokens = count_tokens(&content);

        Ok(ModelAnswer {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// A mock implementation of the `ImageModel` trait.
///
/// Returns a tiny fixed byte payload, or fails every call when constructed
/// via [`MockImageModel::failing`].
#[derive(Debug, Default)]
pub struct MockImageModel {
    fail: AtomicBool,
}

impl MockImageModel {
    /// Creates a mock image model that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self { fail: AtomicBool::new(false) }
    }

    /// Creates a mock image model whose calls always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self { fail: AtomicBool::new(true) }
    }
}

#[async_trait]
impl ImageModel for MockImageModel {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ModelError> {
        debug!(prompt_len = prompt.len(), "MockImageModel generating image");
        if self.fail.load(Ordering::SeqCst) {
            return Err(ModelError::EmptyResponse);
        }
        // PNG magic followed by a marker; enough for tests to assert on.
        Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    fn model_id(&self) -> &str {
        "mock-image"
    }
}

/// Rough token estimate used by the mock model's usage stats.
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
