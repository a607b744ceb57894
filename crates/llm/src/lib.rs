//! Conversational backend integration
//!
//! Features:
//! - Google Gemini `generateContent` over HTTP
//! - Conversation priming with the agent's system prompt
//! - Retry with exponential backoff for transient failures

pub mod gemini;

pub use gemini::{GeminiBackend, GeminiConfig};

use call_agent_core::BackendError;
use thiserror::Error;

/// Gemini client errors
///
/// Retry decisions are made on the [`BackendError`] each maps to.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for BackendError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Api { status, message } => BackendError::Api { status, message },
            LlmError::Network(msg) => BackendError::Network(msg),
            LlmError::InvalidResponse(msg) => BackendError::InvalidResponse(msg),
            LlmError::Timeout => BackendError::Timeout,
            LlmError::Configuration(msg) => BackendError::Configuration(msg),
        }
    }
}
