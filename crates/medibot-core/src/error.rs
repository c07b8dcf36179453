//! Error types for the chat orchestrator.

use medibot_abstraction::ModelError;
use thiserror::Error;

/// An error that fails the whole chat turn.
///
/// Most stage failures degrade instead of erroring; only an empty query and a
/// total inability to obtain an answer surface here.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The query was empty after trimming.
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// No answer could be obtained from any model, including the fallback.
    #[error("Failed to get response from AI: {0}")]
    AnswerUnavailable(#[from] ModelError),
}
