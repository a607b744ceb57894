//! Call session
//!
//! One `CallSession` per call connection. It owns everything a call needs:
//! identity, the outbound link, the hook table, turn state and the
//! conversation. It is handed explicitly to the turn engine and to every
//! hook handler; nothing about a call lives in captured state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;

use call_agent_core::{
    AgentConfiguration, CallIdentity, ConversationHandle, FrameSink, TransportError,
};

use crate::batch::CommandBatch;
use crate::hooks::{HookDispatcher, HookHandler};

/// Conversational turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Greeting,
    Listening,
    Thinking,
    Responding,
    Terminated,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Greeting => "greeting",
            TurnState::Listening => "listening",
            TurnState::Thinking => "thinking",
            TurnState::Responding => "responding",
            TurnState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct CallSession {
    identity: CallIdentity,
    link: Arc<dyn FrameSink>,
    hooks: HookDispatcher,
    state: TurnState,
    agent: Option<AgentConfiguration>,
    conversation: Option<ConversationHandle>,
    turns: u32,
    silent_turns: u32,
    started_at: Instant,
}

impl CallSession {
    pub fn new(identity: CallIdentity, link: Arc<dyn FrameSink>) -> Self {
        Self {
            identity,
            link,
            hooks: HookDispatcher::new(),
            state: TurnState::Greeting,
            agent: None,
            conversation: None,
            turns: 0,
            silent_turns: 0,
            started_at: Instant::now(),
        }
    }

    pub fn identity(&self) -> &CallIdentity {
        &self.identity
    }

    pub fn call_sid(&self) -> &str {
        &self.identity.call_sid
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Move to `next`; `Terminated` is absorbing
    pub fn set_state(&mut self, next: TurnState) {
        if self.is_terminated() {
            return;
        }
        if next == TurnState::Terminated {
            self.terminate();
            return;
        }
        tracing::trace!(call_sid = %self.identity.call_sid, from = %self.state, to = %next, "Turn state");
        self.state = next;
    }

    /// Terminated locally or by the connection (session end, disconnect)
    pub fn is_terminated(&self) -> bool {
        self.state == TurnState::Terminated || self.link.is_terminated()
    }

    pub fn terminate(&mut self) {
        if self.state != TurnState::Terminated {
            tracing::debug!(
                call_sid = %self.identity.call_sid,
                from = %self.state,
                turns = self.turns,
                duration_ms = self.started_at.elapsed().as_millis() as u64,
                "Session terminated"
            );
        }
        self.state = TurnState::Terminated;
        self.link.terminate();
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    pub fn register_hook(&mut self, name: impl Into<String>, handler: Arc<dyn HookHandler>) {
        self.hooks.register(name, handler);
    }

    pub fn agent(&self) -> Option<&AgentConfiguration> {
        self.agent.as_ref()
    }

    pub fn set_agent(&mut self, agent: AgentConfiguration) {
        self.agent = Some(agent);
    }

    pub fn conversation_mut(&mut self) -> Option<&mut ConversationHandle> {
        self.conversation.as_mut()
    }

    pub fn set_conversation(&mut self, conversation: ConversationHandle) {
        self.conversation = Some(conversation);
    }

    /// Count a completed turn; clears the silence streak
    pub fn record_turn(&mut self) -> u32 {
        self.turns += 1;
        self.silent_turns = 0;
        self.turns
    }

    /// Count a silent gather; returns the current streak
    pub fn record_silence(&mut self) -> u32 {
        self.silent_turns += 1;
        self.silent_turns
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn silent_turns(&self) -> u32 {
        self.silent_turns
    }

    /// Send a batch opening new work on the call
    pub fn flush(&mut self, batch: CommandBatch) -> Result<(), TransportError> {
        self.transmit(batch, None)
    }

    /// Send a batch answering the given hook event
    pub fn reply(&mut self, batch: CommandBatch, hook: &str) -> Result<(), TransportError> {
        self.transmit(batch, Some(hook))
    }

    fn transmit(&mut self, batch: CommandBatch, hook: Option<&str>) -> Result<(), TransportError> {
        if batch.is_empty() {
            return Ok(());
        }

        if self.is_terminated() {
            tracing::debug!(
                call_sid = %self.identity.call_sid,
                verbs = %batch.summary(),
                "Discarding batch for terminated session"
            );
            counter!("call_agent_batches_discarded_total").increment(1);
            return Ok(());
        }

        let kind = if hook.is_some() { "reply" } else { "flush" };
        let verbs = batch.len() as u64;
        let summary = batch.summary();
        let ends_call = batch.ends_call();

        if let Err(e) = self.link.send(batch.into_frames()) {
            tracing::debug!(call_sid = %self.identity.call_sid, error = %e, "Batch not sent");
            self.terminate();
            return Err(e);
        }

        tracing::debug!(
            call_sid = %self.identity.call_sid,
            kind,
            hook = hook.unwrap_or_default(),
            verbs = %summary,
            "Batch sent"
        );
        counter!("call_agent_verbs_sent_total", "kind" => kind).increment(verbs);

        if ends_call {
            self.terminate();
        }

        Ok(())
    }
}
