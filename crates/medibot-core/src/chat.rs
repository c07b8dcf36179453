//! The chat turn orchestrator.
//!
//! One `handle` call runs the full turn: input safety, language detection
//! and translation, cache lookup, model routing, answer cleanup, output
//! safety, topic detection, and the time-budgeted step-image fan-out. Most
//! stage failures degrade the response rather than failing the turn; only an
//! empty query and a total inability to obtain an answer return an error.

use std::sync::Arc;
use std::time::Instant;

use medibot_abstraction::{ChatMessage, KeyValueStore, Model, ModelParameters, StreamingModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::budget::compute_image_budget;
use crate::cache::ResponseCache;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::language::{Translator, detect_language};
use crate::pipeline::{StepImagePipeline, StepImageResult};
use crate::prioritize::prioritize_steps;
use crate::prompt::{build_prompt, clean_model_answer};
use crate::router::model_for_query;
use crate::safety::{check_input_safety, check_output_safety};
use crate::steps::extract_treatment_steps;
use crate::topic::{detect_medical_topic, should_generate_images};

/// One user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's query, in any supported language.
    pub query: String,
    /// Whether step-aligned images may be generated for this turn.
    pub generate_images: bool,
    /// Whether the model should show its reasoning.
    pub thinking_mode: bool,
    /// Whether the turn carries attachments (forces the thorough model).
    pub has_attachments: bool,
    /// Prior turns, oldest first.
    pub conversation_history: Vec<ChatMessage>,
}

impl ChatRequest {
    /// A plain text turn with images enabled and no history.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            generate_images: true,
            thinking_mode: false,
            has_attachments: false,
            conversation_history: Vec::new(),
        }
    }
}

/// The assembled response for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The answer, in the user's language.
    pub answer: String,
    /// The query as received.
    pub original_query: String,
    /// Detected language code of the query.
    pub detected_language: String,
    /// Detected medical topic, if any.
    pub topic: Option<String>,
    /// Whether the answer was served from the response cache.
    pub cached: bool,
    /// Per-step image results, sorted by step number.
    pub step_images: Vec<StepImageResult>,
    /// Number of treatment steps parsed from the answer.
    pub steps_count: usize,
}

/// Events emitted by [`ChatOrchestrator::handle_stream`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// An incremental answer chunk.
    Token { text: String },
    /// Turn metadata, sent once after the answer completes.
    Metadata { detected_language: String, topic: Option<String>, cached: bool, steps_count: usize },
    /// The step image results, sent once when image generation finishes.
    StepImages { images: Vec<StepImageResult> },
    /// The turn completed normally.
    Done,
    /// The turn failed; no further events follow.
    Error { message: String },
}

/// Collaborators injected into the orchestrator.
///
/// Everything remote sits behind a trait so tests can swap in mocks.
#[derive(Clone)]
pub struct ChatContext {
    /// Thorough default model for complex queries.
    pub default_model: Arc<dyn Model>,
    /// Fast model for greetings and simple queries.
    pub fast_model: Arc<dyn Model>,
    /// Streaming variant of the default model, when the provider supports it.
    pub streaming_model: Option<Arc<dyn StreamingModel>>,
    /// Step image fan-out.
    pub pipeline: StepImagePipeline,
    /// Response cache; absent means every turn is a miss.
    pub cache: Option<ResponseCache>,
    /// Translation collaborator for non-English turns.
    pub translator: Arc<dyn Translator>,
    /// Sink for persisted chat records; absent disables persistence.
    pub history_sink: Option<Arc<dyn KeyValueStore>>,
    /// Turn configuration.
    pub config: ChatConfig,
}

/// Runs chat turns against a [`ChatContext`].
#[derive(Clone)]
pub struct ChatOrchestrator {
    ctx: ChatContext,
}

impl ChatOrchestrator {
    #[must_use]
    pub fn new(ctx: ChatContext) -> Self {
        Self { ctx }
    }

    /// Runs one full chat turn.
    ///
    /// # Errors
    /// Returns [`ChatError::EmptyQuery`] for a blank query and
    /// [`ChatError::AnswerUnavailable`] when no model, including the
    /// fallback, produced an answer. Every other failure degrades.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let started = Instant::now();
        let original_query = request.query.trim().to_string();
        if original_query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        // Input safety gate. A blocked turn is a normal-shaped refusal.
        let (safe, sanitized, refusal) = check_input_safety(&original_query);
        if !safe {
            warn!("Input blocked by safety check");
            let message = refusal.unwrap_or_default();
            return Ok(self.refusal_response(original_query, message));
        }

        let detected_language = detect_language(&sanitized);
        let english_query = self.to_english(&sanitized, detected_language).await;

        // Cache applies only to context-free turns; history changes meaning.
        if request.conversation_history.is_empty() {
            if let Some(cache) = &self.ctx.cache {
                if let Some(entry) = cache.lookup(&english_query).await {
                    let answer =
                        self.from_english(&entry.response_text, detected_language).await;
                    return Ok(ChatResponse {
                        answer,
                        original_query,
                        detected_language: detected_language.to_string(),
                        topic: entry.topic,
                        cached: true,
                        step_images: Vec::new(),
                        steps_count: 0,
                    });
                }
            }
        }

        let context = history_context(&request.conversation_history, self.ctx.config.history_window);
        let prompt = build_prompt(&english_query, &context, request.thinking_mode);
        let raw_answer =
            self.generate_answer(&prompt, &english_query, request.has_attachments).await?;
        let english_answer = clean_model_answer(&raw_answer, request.thinking_mode);

        let topic = detect_medical_topic(&english_query).map(str::to_string);

        // Output safety gate, also a normal-shaped refusal. Runs before the
        // cache write so a rejected answer is never served again.
        let (output_safe, _, output_refusal) = check_output_safety(&english_answer);
        if !output_safe {
            warn!("Output blocked by safety check");
            let message = output_refusal.unwrap_or_default();
            return Ok(self.refusal_response(original_query, message));
        }

        if request.conversation_history.is_empty() && !request.thinking_mode {
            if let Some(cache) = &self.ctx.cache {
                cache.store(&english_query, &english_answer, topic.clone(), None).await;
            }
        }

        let answer = self.from_english(&english_answer, detected_language).await;

        let (step_images, steps_count) = self
            .generate_step_images(&request, &english_query, &english_answer, started)
            .await;

        let response = ChatResponse {
            answer,
            original_query,
            detected_language: detected_language.to_string(),
            topic,
            cached: false,
            step_images,
            steps_count,
        };

        self.persist_turn(&response);
        Ok(response)
    }

    /// Runs one chat turn, emitting the answer incrementally.
    ///
    /// Tokens arrive first, then one `Metadata` event, then (when images were
    /// generated) one `StepImages` event, then `Done`. Failures emit a single
    /// `Error` event and end the stream.
    #[must_use]
    pub fn handle_stream(&self, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let orchestrator = self.clone();

        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_stream(request, &tx).await {
                let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_stream(
        &self,
        request: ChatRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), ChatError> {
        let started = Instant::now();
        let original_query = request.query.trim().to_string();
        if original_query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        let (safe, sanitized, refusal) = check_input_safety(&original_query);
        if !safe {
            let _ = tx.send(StreamEvent::Token { text: refusal.unwrap_or_default() }).await;
            let _ = tx.send(StreamEvent::Done).await;
            return Ok(());
        }

        let detected_language = detect_language(&sanitized);
        let english_query = self.to_english(&sanitized, detected_language).await;

        if request.conversation_history.is_empty() {
            if let Some(cache) = &self.ctx.cache {
                if let Some(entry) = cache.lookup(&english_query).await {
                    let answer =
                        self.from_english(&entry.response_text, detected_language).await;
                    let _ = tx.send(StreamEvent::Token { text: answer }).await;
                    let _ = tx
                        .send(StreamEvent::Metadata {
                            detected_language: detected_language.to_string(),
                            topic: entry.topic,
                            cached: true,
                            steps_count: 0,
                        })
                        .await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return Ok(());
                }
            }
        }

        let context = history_context(&request.conversation_history, self.ctx.config.history_window);
        let prompt = build_prompt(&english_query, &context, request.thinking_mode);

        // Stream tokens when the provider supports it; English-only turns
        // forward chunks as they arrive, translated turns buffer first.
        let streamed_live = detected_language == "en" && self.ctx.streaming_model.is_some();
        let raw_answer = match (&self.ctx.streaming_model, detected_language) {
            (Some(model), "en") => {
                self.stream_tokens(model.as_ref(), &prompt, tx).await?
            }
            _ => self.generate_answer(&prompt, &english_query, request.has_attachments).await?,
        };
        let english_answer = clean_model_answer(&raw_answer, request.thinking_mode);

        // Output safety gate. Buffered turns swap in the canned refusal;
        // for live-streamed turns the tokens are already on the wire, so the
        // stream stops here, before metadata and images.
        let (output_safe, _, output_refusal) = check_output_safety(&english_answer);
        if !output_safe {
            warn!("Output blocked by safety check");
            if !streamed_live {
                let _ =
                    tx.send(StreamEvent::Token { text: output_refusal.unwrap_or_default() }).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
            return Ok(());
        }

        let topic = detect_medical_topic(&english_query).map(str::to_string);

        if request.conversation_history.is_empty() && !request.thinking_mode {
            if let Some(cache) = &self.ctx.cache {
                cache.store(&english_query, &english_answer, topic.clone(), None).await;
            }
        }

        if !streamed_live {
            let answer = self.from_english(&english_answer, detected_language).await;
            let _ = tx.send(StreamEvent::Token { text: answer }).await;
        }

        let (step_images, steps_count) = self
            .generate_step_images(&request, &english_query, &english_answer, started)
            .await;

        let _ = tx
            .send(StreamEvent::Metadata {
                detected_language: detected_language.to_string(),
                topic,
                cached: false,
                steps_count,
            })
            .await;
        if !step_images.is_empty() {
            let _ = tx.send(StreamEvent::StepImages { images: step_images }).await;
        }
        let _ = tx.send(StreamEvent::Done).await;
        Ok(())
    }

    /// Forwards streamed chunks to the client while accumulating the answer.
    async fn stream_tokens(
        &self,
        model: &dyn StreamingModel,
        prompt: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, ChatError> {
        use futures::StreamExt as _;

        let mut stream = model.stream_text(prompt, Some(self.parameters())).await?;
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            let text = chunk?;
            full.push_str(&text);
            let _ = tx.send(StreamEvent::Token { text }).await;
        }
        Ok(full)
    }

    /// Calls the routed model, retrying once on the default model when the
    /// fast model was chosen and failed.
    async fn generate_answer(
        &self,
        prompt: &str,
        english_query: &str,
        has_attachments: bool,
    ) -> Result<String, ChatError> {
        let model_id = model_for_query(&self.ctx.config, english_query, has_attachments);
        let routed: &Arc<dyn Model> = if model_id == self.ctx.config.fast_model_id {
            &self.ctx.fast_model
        } else {
            &self.ctx.default_model
        };

        match routed.generate_text(prompt, Some(self.parameters())).await {
            Ok(answer) => Ok(answer.content),
            Err(e) if model_id == self.ctx.config.fast_model_id => {
                warn!(error = %e, "Fast model failed, retrying on default model");
                let answer =
                    self.ctx.default_model.generate_text(prompt, Some(self.parameters())).await?;
                Ok(answer.content)
            }
            Err(e) => Err(ChatError::AnswerUnavailable(e)),
        }
    }

    /// Runs the image gate, budget, prioritization, and fan-out for a turn.
    ///
    /// Returns the image results and the total parsed step count. Always
    /// succeeds; an empty result means the gate or the budget said no.
    async fn generate_step_images(
        &self,
        request: &ChatRequest,
        english_query: &str,
        english_answer: &str,
        started: Instant,
    ) -> (Vec<StepImageResult>, usize) {
        if !request.generate_images || !should_generate_images(english_query, english_answer) {
            return (Vec::new(), 0);
        }

        let steps = extract_treatment_steps(english_answer);
        let steps_count = steps.len();
        if steps.is_empty() {
            return (Vec::new(), 0);
        }

        let config = &self.ctx.config;
        let budget = compute_image_budget(
            started.elapsed().as_secs_f64(),
            config.deadline_seconds,
            config.buffer_seconds,
            config.seconds_per_image,
        );
        let selected = prioritize_steps(&steps, budget);
        if selected.is_empty() {
            info!(steps = steps_count, "No image budget remaining, skipping generation");
            return (Vec::new(), steps_count);
        }

        let correlation_id = correlation_id(english_query);
        let images = self.ctx.pipeline.generate(selected, &correlation_id).await;
        (images, steps_count)
    }

    /// Persists the finished turn in the background. Fire and forget.
    fn persist_turn(&self, response: &ChatResponse) {
        let Some(sink) = self.ctx.history_sink.clone() else { return };
        let chat_id = Uuid::new_v4().to_string();
        let record = serde_json::json!({
            "chat_id": chat_id,
            "query": response.original_query,
            "answer": response.answer,
            "language": response.detected_language,
            "topic": response.topic,
            "steps_count": response.steps_count,
            "images_generated": response.step_images.iter().filter(|i| !i.failed).count(),
            "created_at": chrono::Utc::now().timestamp(),
        });
        let key = chat_record_key(&chat_id);
        tokio::spawn(async move {
            if let Err(e) = sink.put(&key, record).await {
                warn!(error = %e, "Chat record persistence failed (non-fatal)");
            }
        });
    }

    fn refusal_response(&self, original_query: String, message: String) -> ChatResponse {
        let detected_language = detect_language(&original_query).to_string();
        ChatResponse {
            answer: message,
            original_query,
            detected_language,
            topic: None,
            cached: false,
            step_images: Vec::new(),
            steps_count: 0,
        }
    }

    fn parameters(&self) -> ModelParameters {
        ModelParameters {
            temperature: Some(self.ctx.config.temperature),
            max_tokens: Some(self.ctx.config.max_tokens),
        }
    }

    /// Translates a query into English; failures degrade to the original.
    async fn to_english(&self, text: &str, language: &str) -> String {
        if language == "en" {
            return text.to_string();
        }
        match self.ctx.translator.to_english(text, language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(error = %e, language, "Translation to English failed, using original text");
                text.to_string()
            }
        }
    }

    /// Translates an answer back to the user's language; failures degrade to
    /// the English answer.
    async fn from_english(&self, text: &str, language: &str) -> String {
        if language == "en" {
            return text.to_string();
        }
        match self.ctx.translator.from_english(text, language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(error = %e, language, "Translation from English failed, returning English");
                text.to_string()
            }
        }
    }
}

/// Folds the most recent history messages into a prompt context block.
fn history_context(history: &[ChatMessage], window: usize) -> String {
    if history.is_empty() || window == 0 {
        return String::new();
    }
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Storage key for a persisted chat record. The timestamp keeps keys
/// roughly time-ordered; the UUID keeps same-millisecond turns from
/// overwriting each other.
fn chat_record_key(chat_id: &str) -> String {
    format!("chats/{}_{}", chrono::Utc::now().timestamp_millis(), chat_id)
}

/// Short request-scoped ID for grouping a turn's step images in storage.
fn correlation_id(english_query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(english_query.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_context_windows_recent_messages() {
        let history = vec![
            ChatMessage { role: "user".to_string(), content: "one".to_string() },
            ChatMessage { role: "assistant".to_string(), content: "two".to_string() },
            ChatMessage { role: "user".to_string(), content: "three".to_string() },
        ];
        let context = history_context(&history, 2);
        assert_eq!(context, "assistant: two\nuser: three");
        assert!(history_context(&history, 0).is_empty());
        assert!(history_context(&[], 4).is_empty());
    }

    #[test]
    fn test_chat_record_keys_do_not_collide() {
        let a = chat_record_key("11111111-1111-4111-8111-111111111111");
        let b = chat_record_key("22222222-2222-4222-8222-222222222222");
        assert_ne!(a, b);
        assert!(a.starts_with("chats/"));
        assert!(a.ends_with("11111111-1111-4111-8111-111111111111"));
    }

    #[test]
    fn test_correlation_id_is_stable_and_short() {
        let a = correlation_id("how to treat a burn");
        let b = correlation_id("how to treat a burn");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, correlation_id("how to perform cpr"));
    }
}
