//! Chat backend configuration.
//!
//! Constructed once at process start and injected into the orchestrator;
//! nothing reads environment variables after startup.

use std::env;

use serde::{Deserialize, Serialize};

/// Configuration for one chat backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Default (thorough) text model ID.
    pub default_model_id: String,
    /// Fast model ID for simple queries.
    pub fast_model_id: String,
    /// Maximum wall-clock seconds the whole invocation may take.
    pub deadline_seconds: f64,
    /// Seconds reserved for response assembly, translation, and persistence
    /// after image generation completes.
    pub buffer_seconds: f64,
    /// Empirical average image generation latency.
    pub seconds_per_image: f64,
    /// Concurrent image generation tasks per request.
    pub max_image_workers: usize,
    /// Response cache TTL in hours.
    pub cache_ttl_hours: i64,
    /// Presigned image URL lifetime in seconds (7 days).
    pub presign_ttl_seconds: u64,
    /// Conversation-history messages folded into the prompt context.
    pub history_window: usize,
    /// Max tokens requested from the text model.
    pub max_tokens: u32,
    /// Sampling temperature for the text model.
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model_id: "gemini-2.5-pro".to_string(),
            fast_model_id: "gemini-2.5-flash".to_string(),
            deadline_seconds: 300.0,
            buffer_seconds: 60.0,
            seconds_per_image: 3.0,
            max_image_workers: 5,
            cache_ttl_hours: 24,
            presign_ttl_seconds: 604_800,
            history_window: 4,
            max_tokens: 1536,
            temperature: 0.7,
        }
    }
}

impl ChatConfig {
    /// Builds a config from defaults with environment-variable overrides.
    ///
    /// Recognized variables: `GEMINI_LLM_MODEL`, `GEMINI_FAST_MODEL`,
    /// `CHAT_DEADLINE_SECONDS`, `CACHE_TTL_HOURS`, `IMAGE_WORKERS`.
    /// Unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = env::var("GEMINI_LLM_MODEL") {
            config.default_model_id = model;
        }
        if let Ok(model) = env::var("GEMINI_FAST_MODEL") {
            config.fast_model_id = model;
        }
        if let Some(deadline) = env_parse::<f64>("CHAT_DEADLINE_SECONDS") {
            config.deadline_seconds = deadline;
        }
        if let Some(ttl) = env_parse::<i64>("CACHE_TTL_HOURS") {
            config.cache_ttl_hours = ttl;
        }
        if let Some(workers) = env_parse::<usize>("IMAGE_WORKERS") {
            config.max_image_workers = workers;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
