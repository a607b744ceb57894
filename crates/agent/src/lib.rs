//! Call sessions and the conversational turn engine
//!
//! Features:
//! - Per-call `CallSession` with explicit state, passed to every handler
//! - Command batches sent over a single ordered outbound link
//! - Hook routing by first-registered substring match
//! - Greeting, listening, thinking and responding turn cycle
//! - Registry of live calls with a capacity limit

pub mod batch;
pub mod hooks;
pub mod link;
pub mod registry;
pub mod session;
pub mod turn;

pub use batch::CommandBatch;
pub use hooks::{dispatch, HookDispatcher, HookHandler};
pub use link::{CallLink, FrameReceiver};
pub use registry::{CallConnection, SessionRegistry, SessionStart};
pub use session::{CallSession, TurnState};
pub use turn::TurnEngine;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Call capacity reached ({0} concurrent calls)")]
    AtCapacity(usize),
}
