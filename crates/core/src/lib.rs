//! Core types for the call agent
//!
//! This crate provides the pieces shared by every other crate:
//! - Call-control protocol types and the message codec
//! - Verb model for outbound call-control commands
//! - Agent profile and turn defaults
//! - Collaborator traits (conversational backend, config resolver, frame sink)
//! - Error taxonomy

pub mod codec;
pub mod error;
pub mod profile;
pub mod protocol;
pub mod traits;
pub mod verb;

pub use codec::{decode, encode};
pub use error::{
    BackendError, CodecError, ConfigResolutionError, HandlerError, TransportError,
};
pub use profile::{
    AgentConfiguration, AgentProfile, LlmProfile, RecognizerProfile, SynthesizerProfile,
    TurnDefaults,
};
pub use protocol::{
    CallDirection, CallIdentity, HookEvent, InboundBody, InboundMessage, MessageId, OutboundFrame,
};
pub use traits::{
    ChatRole, ChatTurn, ConfigResolver, ConversationBackend, ConversationHandle, FrameSink,
};
pub use verb::{GatherRequest, RecognizerConfig, SynthesizerConfig, Verb};
