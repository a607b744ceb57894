//! Hook dispatch
//!
//! The platform reports outcomes (recognized speech, timeouts) as hook events
//! naming the hook they belong to. The identifier may be a bare path
//! (`/onSpeech`) or a full URL (`wss://host/onSpeech`), so a handler
//! registered under a name matches any identifier containing that name.
//! Handlers are checked in registration order and the first match wins.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;

use call_agent_core::{HandlerError, HookEvent};

use crate::batch::CommandBatch;
use crate::session::CallSession;

/// Handler for hook events of one session
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, session: &mut CallSession, event: HookEvent)
        -> Result<(), HandlerError>;
}

/// Ordered hook table
#[derive(Clone, Default)]
pub struct HookDispatcher {
    handlers: Vec<(String, Arc<dyn HookHandler>)>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; an existing registration under the same name is
    /// replaced in place and keeps its priority.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn HookHandler>) {
        let name = name.into();
        if name.is_empty() {
            tracing::warn!("Ignoring hook registration with empty name");
            return;
        }

        match self.handlers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = handler,
            None => self.handlers.push((name, handler)),
        }
    }

    /// First registered handler whose name occurs in `hook`
    pub fn lookup(&self, hook: &str) -> Option<&Arc<dyn HookHandler>> {
        self.handlers
            .iter()
            .find(|(name, _)| hook.contains(name.as_str()))
            .map(|(_, handler)| handler)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Route one hook event to the session's handler
///
/// Never fails: unroutable events are dropped with a warning, and a failing
/// handler ends the call with a hangup.
pub async fn dispatch(session: &mut CallSession, event: HookEvent) {
    if session.is_terminated() {
        tracing::debug!(call_sid = %session.call_sid(), "Dropping hook event for terminated session");
        return;
    }

    let Some(hook) = event.hook.clone() else {
        tracing::warn!(call_sid = %session.call_sid(), "Hook event without hook identifier, dropped");
        counter!("call_agent_hook_events_total", "result" => "unrouted").increment(1);
        return;
    };

    let Some(handler) = session.hooks().lookup(&hook).cloned() else {
        tracing::warn!(
            call_sid = %session.call_sid(),
            hook = %hook,
            registered = ?session.hooks().names().collect::<Vec<_>>(),
            "No handler for hook, dropped"
        );
        counter!("call_agent_hook_events_total", "result" => "unrouted").increment(1);
        return;
    };

    counter!("call_agent_hook_events_total", "result" => "routed").increment(1);

    if let Err(e) = handler.handle(session, event).await {
        tracing::error!(call_sid = %session.call_sid(), hook = %hook, error = %e, "Hook handler failed");
        counter!("call_agent_handler_errors_total").increment(1);

        if !e.is_transport() {
            // Best effort; the connection may already be gone
            let _ = session.reply(CommandBatch::new().hangup(), &hook);
        }
        session.terminate();
    }
}
