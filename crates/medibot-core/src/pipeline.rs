//! Step-aligned image generation pipeline.
//!
//! One selected step maps to one image: a four-quadrant instructional grid
//! explaining that step in depth. Steps are processed concurrently under a
//! bounded worker pool; each task is fault-isolated and degrades to four
//! templated caption fields when generation fails, so a bad step never
//! affects its siblings or the main answer. Results are re-sorted by step
//! number before returning, so completion races never change the response
//! shape.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use medibot_abstraction::{ImageModel, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::steps::TreatmentStep;

/// Default presigned URL lifetime: 7 days.
pub const DEFAULT_PRESIGN_TTL_SECONDS: u64 = 604_800;

/// Templated captions substituted when a step's image cannot be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackText {
    /// The primary action of the step.
    pub action: String,
    /// How to perform it.
    pub method: String,
    /// Common mistakes to avoid.
    pub caution: String,
    /// Expected outcome when done correctly.
    pub result: String,
}

impl FallbackText {
    /// Builds the four caption fields from a step's title and description.
    #[must_use]
    pub fn for_step(step: &TreatmentStep) -> Self {
        let summary: String = step.description.chars().take(80).collect();
        Self {
            action: format!("Primary action for {}", step.title),
            method: format!("How to perform: {summary}..."),
            caution: "Common mistakes to avoid when performing this step.".to_string(),
            result: "Expected outcome when done correctly.".to_string(),
        }
    }
}

/// The outcome of image generation for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepImageResult {
    /// Step number as parsed from the answer text.
    pub step_number: String,
    /// Step title.
    pub title: String,
    /// Step description (already truncated by the extractor).
    pub description: String,
    /// The prompt sent to the image model.
    pub image_prompt: String,
    /// Base64-encoded image bytes, when generation succeeded.
    pub image_base64: Option<String>,
    /// Time-limited retrieval URL, when the image was uploaded.
    pub image_url: Option<String>,
    /// Blob storage key, kept for future URL regeneration.
    pub storage_key: Option<String>,
    /// True when generation failed and `fallback_text` applies.
    pub failed: bool,
    /// Degradation captions, populated only on failure.
    pub fallback_text: Option<FallbackText>,
}

/// Builds the four-quadrant visual guide prompt for one step.
#[must_use]
pub fn build_step_prompt(step: &TreatmentStep) -> String {
    let description: String = step.description.chars().take(200).collect();
    format!(
        "Generate a medically informative visual guide using a 2x2 grid layout.\n\
         \n\
         Context:\n\
         This image explains Step {number} of a medical assistance guide.\n\
         \n\
         Step Description:\n\
         \"{title}: {description}\"\n\
         \n\
         Grid Requirements:\n\
         Each panel must visually represent one sub-direction of the same step:\n\
         \n\
         Top-Left Panel:\n\
         Show the primary action clearly and safely.\n\
         \n\
         Top-Right Panel:\n\
         Show the correct method or technique (posture, tool usage, hand placement).\n\
         \n\
         Bottom-Left Panel:\n\
         Show what NOT to do or common mistakes, using clear visual contrast.\n\
         \n\
         Bottom-Right Panel:\n\
         Show the expected correct outcome or confirmation state.\n\
         \n\
         Visual Style:\n\
         - Clear, instructional, non-graphic\n\
         - Neutral medical illustration style\n\
         - No blood, gore, or invasive depiction\n\
         - High clarity, simple background\n\
         - Universally understandable symbols\n\
         \n\
         Restrictions:\n\
         - Do not add extra steps\n\
         - Do not contradict the step text\n\
         - Do not include text-heavy labels\n\
         - Avoid realism that may cause distress\n\
         \n\
         Purpose:\n\
         This image must act as a complete visual explanation of Step {number}.\n",
        number = step.step_number,
        title = step.title,
    )
}

/// Concurrent per-step image generator.
#[derive(Clone)]
pub struct StepImagePipeline {
    image_model: Arc<dyn ImageModel>,
    object_store: Option<Arc<dyn ObjectStore>>,
    max_workers: usize,
    presign_ttl_seconds: u64,
}

impl StepImagePipeline {
    /// Creates a pipeline over the given image model, without blob storage.
    #[must_use]
    pub fn new(image_model: Arc<dyn ImageModel>, max_workers: usize) -> Self {
        Self {
            image_model,
            object_store: None,
            max_workers: max_workers.max(1),
            presign_ttl_seconds: DEFAULT_PRESIGN_TTL_SECONDS,
        }
    }

    /// Attaches a blob store; generated images are uploaded and presigned.
    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Overrides the presigned URL lifetime.
    #[must_use]
    pub fn with_presign_ttl(mut self, ttl_seconds: u64) -> Self {
        self.presign_ttl_seconds = ttl_seconds;
        self
    }

    /// Generates one image per step, concurrently, bounded by the worker cap.
    ///
    /// Results come back sorted by the numeric value of each step number;
    /// if any number fails to parse, completion order is kept instead.
    /// Never errors: failed steps carry `failed = true` and fallback text.
    pub async fn generate(
        &self,
        steps: Vec<TreatmentStep>,
        correlation_id: &str,
    ) -> Vec<StepImageResult> {
        if steps.is_empty() {
            return Vec::new();
        }

        info!(step_count = steps.len(), max_workers = self.max_workers, "Generating step-aligned images");

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set = JoinSet::new();

        for step in steps {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let correlation_id = correlation_id.to_string();
            join_set.spawn(async move {
                // Closed only if the set is aborted, which we never do.
                let _permit = semaphore.acquire_owned().await;
                pipeline.process_step(step, &correlation_id).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Step image task panicked"),
            }
        }

        sort_by_step_number(&mut results);
        results
    }

    /// Processes a single step: prompt, generate, upload, presign.
    ///
    /// This is the only user-facing degradation path: every failure mode
    /// ends in `failed = true` plus fallback captions, never an error.
    async fn process_step(&self, step: TreatmentStep, correlation_id: &str) -> StepImageResult {
        let image_prompt = build_step_prompt(&step);
        info!(step_number = %step.step_number, "Generating step visual guide");

        let mut result = StepImageResult {
            step_number: step.step_number.clone(),
            title: step.title.clone(),
            description: step.description.chars().take(200).collect(),
            image_prompt,
            image_base64: None,
            image_url: None,
            storage_key: None,
            failed: false,
            fallback_text: None,
        };

        match self.image_model.generate_image(&result.image_prompt).await {
            Ok(bytes) => {
                result.image_base64 = Some(BASE64.encode(&bytes));
                if let Some(store) = &self.object_store {
                    let (url, key) = self.upload(store, &step.step_number, correlation_id, bytes).await;
                    result.image_url = url;
                    result.storage_key = key;
                }
            }
            Err(e) => {
                warn!(step_number = %step.step_number, error = %e, "Image generation failed, using fallback text");
                result.failed = true;
                result.fallback_text = Some(FallbackText::for_step(&step));
            }
        }

        result
    }

    /// Uploads image bytes and presigns a retrieval URL.
    ///
    /// Upload problems are not failures of the step: the base64 payload is
    /// still returned inline, so both outcomes are logged and absorbed.
    async fn upload(
        &self,
        store: &Arc<dyn ObjectStore>,
        step_number: &str,
        correlation_id: &str,
        bytes: Vec<u8>,
    ) -> (Option<String>, Option<String>) {
        let suffix = Uuid::new_v4().simple().to_string();
        let key = format!("steps/{}/step_{}_{}.png", correlation_id, step_number, &suffix[..8]);

        if let Err(e) = store.put(&key, bytes, "image/png").await {
            warn!(error = %e, key = %key, "Image upload failed");
            return (None, None);
        }

        match store.presign(&key, self.presign_ttl_seconds).await {
            Ok(url) => {
                info!(key = %key, "Uploaded step image");
                (Some(url), Some(key))
            }
            Err(e) => {
                warn!(error = %e, key = %key, "Presign failed");
                (None, Some(key))
            }
        }
    }
}

/// Sorts results by the numeric value of `step_number`, stripping non-digit
/// characters first. If any number is unparsable, the incoming (completion)
/// order is preserved rather than erroring.
fn sort_by_step_number(results: &mut [StepImageResult]) {
    let keys: Option<Vec<u64>> = results
        .iter()
        .map(|r| {
            let digits: String = r.step_number.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        })
        .collect();

    if let Some(keys) = keys {
        let mut order: Vec<usize> = (0..results.len()).collect();
        order.sort_by_key(|&i| keys[i]);
        let mut sorted: Vec<StepImageResult> =
            order.into_iter().map(|i| results[i].clone()).collect();
        results.swap_with_slice(&mut sorted);
    }
}
