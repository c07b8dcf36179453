//! MediBot CLI - one-shot chat against the MediBot backend.
//!
//! Runs a full chat turn (answer, safety checks, cache, step images) from
//! the terminal, against either the mock provider or Gemini.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use medibot_abstraction::StreamingModel;
use medibot_core::chat::{ChatContext, ChatOrchestrator, ChatRequest, StreamEvent};
use medibot_core::{ChatConfig, NoopTranslator, ResponseCache, StepImagePipeline, warm_cache};
use medibot_models::{
    GeminiModel, MemoryKeyValueStore, MemoryObjectStore, ModelFactory, ModelType,
};
use tokio_stream::StreamExt as _;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MediBot - step-by-step medical guidance with visual aids
#[derive(Parser, Debug)]
#[command(
    name = "medibot",
    author,
    version,
    about = "MediBot - medical assistance chat with step-aligned visual guides"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Model provider (mock, gemini)
    #[arg(short, long, default_value = "mock", global = true)]
    provider: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask a medical question and print the answer with step image status
    Chat {
        /// The question to ask
        query: String,

        /// Skip step image generation
        #[arg(long)]
        no_images: bool,

        /// Ask the model to show its reasoning
        #[arg(long)]
        thinking: bool,

        /// Stream the answer token by token
        #[arg(long)]
        stream: bool,
    },

    /// Pre-generate and cache answers for common first-aid queries
    Warm,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = Level::from_str(&args.log_level).unwrap_or(Level::WARN);
    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ChatConfig::from_env();
    let orchestrator = build_orchestrator(&args.provider, &config)?;

    match args.command {
        Command::Chat { query, no_images, thinking, stream } => {
            let request = ChatRequest {
                query,
                generate_images: !no_images,
                thinking_mode: thinking,
                has_attachments: false,
                conversation_history: Vec::new(),
            };
            if stream {
                run_stream(&orchestrator, request).await;
            } else {
                run_chat(&orchestrator, request).await?;
            }
        }
        Command::Warm => {
            let model = ModelFactory::create_from_str(&args.provider, config.default_model_id)
                .context("failed to create model")?;
            let cache = ResponseCache::new(Arc::new(MemoryKeyValueStore::new()), config.cache_ttl_hours);
            let report = warm_cache(model, &cache, true).await;
            println!(
                "Warmed {}/{} queries ({} skipped, {} failed)",
                report.warmed, report.total, report.skipped, report.failed
            );
        }
    }

    Ok(())
}

fn build_orchestrator(provider: &str, config: &ChatConfig) -> anyhow::Result<ChatOrchestrator> {
    let default_model =
        ModelFactory::create_from_str(provider, config.default_model_id.clone())
            .context("failed to create default model")?;
    let fast_model = ModelFactory::create_from_str(provider, config.fast_model_id.clone())
        .context("failed to create fast model")?;
    let image_model =
        ModelFactory::create_image_model(provider).context("failed to create image model")?;

    // Only Gemini supports token streaming.
    let streaming_model: Option<Arc<dyn StreamingModel>> = match ModelType::from_str(provider) {
        Ok(ModelType::Gemini) => Some(Arc::new(
            GeminiModel::new(config.default_model_id.clone())
                .context("failed to create streaming model")?,
        )),
        _ => None,
    };

    let pipeline = StepImagePipeline::new(image_model, config.max_image_workers)
        .with_object_store(Arc::new(MemoryObjectStore::new()))
        .with_presign_ttl(config.presign_ttl_seconds);
    let cache = ResponseCache::new(Arc::new(MemoryKeyValueStore::new()), config.cache_ttl_hours);

    Ok(ChatOrchestrator::new(ChatContext {
        default_model,
        fast_model,
        streaming_model,
        pipeline,
        cache: Some(cache),
        translator: Arc::new(NoopTranslator),
        history_sink: None,
        config: config.clone(),
    }))
}

async fn run_chat(orchestrator: &ChatOrchestrator, request: ChatRequest) -> anyhow::Result<()> {
    let response = orchestrator.handle(request).await?;

    println!("{}\n", response.answer);
    if let Some(topic) = &response.topic {
        println!("Topic: {topic}");
    }
    if response.steps_count > 0 {
        println!(
            "Steps: {} parsed, {} images attempted",
            response.steps_count,
            response.step_images.len()
        );
        for image in &response.step_images {
            let status = if image.failed {
                "fallback text".to_string()
            } else {
                image.image_url.clone().unwrap_or_else(|| "inline base64".to_string())
            };
            println!("  Step {}: {} [{}]", image.step_number, image.title, status);
        }
    }
    Ok(())
}

async fn run_stream(orchestrator: &ChatOrchestrator, request: ChatRequest) {
    use std::io::Write as _;

    let mut stream = orchestrator.handle_stream(request);
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Token { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::Metadata { topic, steps_count, .. } => {
                println!();
                if let Some(topic) = topic {
                    println!("Topic: {topic}");
                }
                if steps_count > 0 {
                    println!("Steps parsed: {steps_count}");
                }
            }
            StreamEvent::StepImages { images } => {
                for image in &images {
                    let status = if image.failed { "fallback text" } else { "generated" };
                    println!("  Step {}: {} [{}]", image.step_number, image.title, status);
                }
            }
            StreamEvent::Error { message } => {
                eprintln!("error: {message}");
                return;
            }
            StreamEvent::Done => {}
        }
    }
}
