//! Core chat backend: orchestration, caching, safety, and the time-budgeted
//! step-image pipeline.
//!
//! The entry point is [`ChatOrchestrator`], which runs a full turn against a
//! [`ChatContext`] of injected collaborators. Everything below it is a pure
//! or near-pure stage: query normalization and caching, step extraction,
//! budget planning, prioritization, and the concurrent image fan-out.

pub mod budget;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod prioritize;
pub mod prompt;
pub mod router;
pub mod safety;
pub mod steps;
pub mod topic;
pub mod warmer;

pub use budget::{MAX_IMAGES_PER_REQUEST, compute_image_budget};
pub use cache::{CacheEntry, ResponseCache, cache_key, normalize_query};
pub use chat::{ChatContext, ChatOrchestrator, ChatRequest, ChatResponse, StreamEvent};
pub use config::ChatConfig;
pub use error::ChatError;
pub use language::{NoopTranslator, Translator, detect_language};
pub use pipeline::{FallbackText, StepImagePipeline, StepImageResult, build_step_prompt};
pub use prioritize::prioritize_steps;
pub use router::{QueryComplexity, classify_query_complexity};
pub use steps::{TreatmentStep, extract_treatment_steps};
pub use topic::{detect_medical_topic, should_generate_images};
pub use warmer::{WarmReport, warm_cache};
