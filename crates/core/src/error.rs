//! Error taxonomy
//!
//! Each error is contained at a different boundary:
//! - `CodecError`: malformed inbound frame, dropped by the connection reader
//! - `ConfigResolutionError`: no usable agent profile, the call ends with an apology
//! - `BackendError`: conversational backend fault, replaced by a fallback utterance
//! - `HandlerError`: hook handler failure, the call is hung up
//! - `TransportError`: the connection is gone, the session is treated as terminated

use thiserror::Error;

use crate::protocol::MessageId;

/// Message codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Not a JSON object at all
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Parsed envelope with an unusable body; the msgid is still owed an ack
    #[error("Invalid message: {reason}")]
    InvalidBody {
        msgid: Option<MessageId>,
        reason: String,
    },

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl CodecError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        CodecError::MalformedMessage(msg.into())
    }

    /// Identifier of the rejected message, when its envelope was readable
    pub fn msgid(&self) -> Option<&MessageId> {
        match self {
            CodecError::InvalidBody { msgid, .. } => msgid.as_ref(),
            _ => None,
        }
    }
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The outbound stream is gone (socket closed, writer ended)
    #[error("Connection closed")]
    Closed,

    /// The session reached a terminal state; no more verbs are accepted
    #[error("Session terminated")]
    Terminated,
}

/// Conversational backend errors
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BackendError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(_) | BackendError::Timeout => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Agent configuration resolution errors
#[derive(Error, Debug, Clone)]
pub enum ConfigResolutionError {
    #[error("No agent configured for {0}")]
    NotFound(String),

    #[error("Config backend returned status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Hook handler errors
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid session state: {0}")]
    State(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether the connection is already gone, so no hangup can be delivered
    pub fn is_transport(&self) -> bool {
        matches!(self, HandlerError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_retryable() {
        assert!(BackendError::Network("reset".into()).is_retryable());
        assert!(BackendError::Timeout.is_retryable());
        assert!(BackendError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(BackendError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!BackendError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!BackendError::InvalidResponse("empty".into()).is_retryable());
    }

    #[test]
    fn test_handler_error_from_transport() {
        let err: HandlerError = TransportError::Closed.into();
        assert!(err.is_transport());
        assert!(!HandlerError::Internal("boom".into()).is_transport());
    }
}
