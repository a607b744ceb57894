//! Collaborator traits
//!
//! The turn engine talks to the outside world only through these seams:
//!
//! ```text
//!   ConfigResolver       phone number -> AgentProfile
//!   ConversationBackend  system prompt / utterance -> reply text
//!   FrameSink            outbound frames -> call-control connection
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, ConfigResolutionError, TransportError};
use crate::profile::AgentProfile;
use crate::protocol::{MessageId, OutboundFrame};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// Conversation state for a single call; dropped with the call
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHandle {
    pub model: String,
    pub history: Vec<ChatTurn>,
}

impl ConversationHandle {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Record a completed exchange
    pub fn record_exchange(&mut self, utterance: impl Into<String>, reply: impl Into<String>) {
        self.history.push(ChatTurn::user(utterance));
        self.history.push(ChatTurn::model(reply));
    }
}

/// Text generation capability backing the dialogue
///
/// Implementations:
/// - `GeminiBackend` - Google Gemini `generateContent`
#[async_trait]
pub trait ConversationBackend: Send + Sync + 'static {
    /// Open a conversation primed with the system prompt
    async fn start(
        &self,
        model: &str,
        system_prompt: &str,
    ) -> Result<ConversationHandle, BackendError>;

    /// Send one utterance and return the reply.
    ///
    /// On success the exchange is appended to the handle's history; on
    /// failure the history is left untouched.
    async fn send(
        &self,
        handle: &mut ConversationHandle,
        utterance: &str,
    ) -> Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Source of per-number agent profiles
///
/// Implementations enforce their own bounded timeout; a timeout is reported
/// as `ConfigResolutionError::Timeout`.
#[async_trait]
pub trait ConfigResolver: Send + Sync + 'static {
    async fn resolve(&self, number: &str) -> Result<AgentProfile, ConfigResolutionError>;
}

/// Outbound half of a call-control connection
///
/// All frames of one connection go through a single ordered stream.
pub trait FrameSink: Send + Sync {
    /// Send a batch of frames as one unit, in order.
    ///
    /// Fails with `TransportError::Terminated` once the session is terminated.
    fn send(&self, frames: Vec<OutboundFrame>) -> Result<(), TransportError>;

    /// Acknowledge an inbound message. Allowed until the stream is gone.
    fn acknowledge(&self, msgid: MessageId) -> Result<(), TransportError>;

    /// Mark the session terminated; later `send` calls are refused
    fn terminate(&self);

    fn is_terminated(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_exchange() {
        let mut handle = ConversationHandle::new("gemini-2.0-flash-exp");
        handle.record_exchange("merhaba", "Merhaba, nasıl yardımcı olabilirim?");

        assert_eq!(handle.history.len(), 2);
        assert_eq!(handle.history[0], ChatTurn::user("merhaba"));
        assert_eq!(handle.history[1].role, ChatRole::Model);
    }
}
