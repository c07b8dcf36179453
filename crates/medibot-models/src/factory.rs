//! Model factory for creating model instances from configuration.
//!
//! Handles API key loading from environment variables and keeps provider
//! selection in one place.

use std::str::FromStr;
use std::sync::Arc;

use medibot_abstraction::{ImageModel, Model, ModelError};
use tracing::debug;

use crate::image::GeminiImageModel;
use crate::{GeminiModel, MockImageModel, MockModel};

/// Model provider enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Mock model for testing and offline runs.
    Mock,
    /// Google Gemini model.
    Gemini,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "gemini" => Ok(Self::Gemini),
            _ => Err(()),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The type of model to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "gemini-2.5-pro").
    pub model_id: String,
    /// Optional API key (if not provided, loaded from environment).
    pub api_key: Option<String>,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self { model_type, model_id, api_key: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a text model instance from the given configuration.
    ///
    /// # Errors
    /// Returns `ModelError` if the provider is misconfigured (e.g., missing
    /// API key).
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        debug!(model_type = ?config.model_type, model_id = %config.model_id, "Creating model");
        match config.model_type {
            ModelType::Mock => Ok(Arc::new(MockModel::new(config.model_id))),
            ModelType::Gemini => {
                let model = match config.api_key {
                    Some(key) => GeminiModel::with_api_key(config.model_id, key),
                    None => GeminiModel::new(config.model_id)?,
                };
                Ok(Arc::new(model))
            }
        }
    }

    /// Creates a text model from a provider name string.
    ///
    /// # Errors
    /// Returns `ModelError::UnsupportedModelProvider` for unknown providers.
    pub fn create_from_str(
        provider: &str,
        model_id: String,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        let model_type = ModelType::from_str(provider).map_err(|()| {
            ModelError::UnsupportedModelProvider(format!("Unknown provider: {}", provider))
        })?;
        Self::create(ModelConfig::new(model_type, model_id))
    }

    /// Creates an image model instance for the given provider.
    ///
    /// # Errors
    /// Returns `ModelError` if the provider is unknown or misconfigured.
    pub fn create_image_model(
        provider: &str,
    ) -> Result<Arc<dyn ImageModel + Send + Sync>, ModelError> {
        let model_type = ModelType::from_str(provider).map_err(|()| {
            ModelError::UnsupportedModelProvider(format!("Unknown provider: {}", provider))
        })?;
        match model_type {
            ModelType::Mock => Ok(Arc::new(MockImageModel::new())),
            ModelType::Gemini => Ok(Arc::new(GeminiImageModel::new()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_from_str() {
        assert_eq!(ModelType::from_str("mock"), Ok(ModelType::Mock));
        assert_eq!(ModelType::from_str("Gemini"), Ok(ModelType::Gemini));
        assert_eq!(ModelType::from_str("GEMINI"), Ok(ModelType::Gemini));
        assert!(ModelType::from_str("claude-9000").is_err());
    }

    #[test]
    fn test_create_mock_model() {
        let model =
            ModelFactory::create(ModelConfig::new(ModelType::Mock, "test-model".to_string()))
                .unwrap();
        assert_eq!(model.model_id(), "test-model");
    }

    #[test]
    fn test_create_from_str_rejects_unknown_provider() {
        let result = ModelFactory::create_from_str("carrier-pigeon", "m".to_string());
        assert!(matches!(result, Err(ModelError::UnsupportedModelProvider(_))));
    }
}
