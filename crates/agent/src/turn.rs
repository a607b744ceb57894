//! Turn engine
//!
//! Drives one call through the conversational state machine:
//!
//! ```text
//!   Greeting ──resolve──▶ Listening ──transcript──▶ Thinking ──reply──▶ Responding
//!      │                    ▲  │ silence                                   │
//!      │ no config          │  └───────── re-arm gather ◀──────────────────┘
//!      ▼                    │
//!   Terminated ◀── hangup / session end / disconnect (from any state)
//! ```
//!
//! Configuration failures end the call with an apology. Backend failures
//! never end the call: the fallback utterance is spoken instead.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};

use call_agent_core::{
    AgentConfiguration, AgentProfile, CallDirection, ConfigResolutionError, ConfigResolver,
    ConversationBackend, HandlerError, HookEvent, TurnDefaults,
};

use crate::batch::CommandBatch;
use crate::hooks::HookHandler;
use crate::registry::SessionStart;
use crate::session::{CallSession, TurnState};

#[derive(Clone)]
pub struct TurnEngine {
    resolver: Arc<dyn ConfigResolver>,
    backend: Arc<dyn ConversationBackend>,
    defaults: Arc<TurnDefaults>,
}

impl TurnEngine {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        backend: Arc<dyn ConversationBackend>,
        defaults: TurnDefaults,
    ) -> Self {
        Self {
            resolver,
            backend,
            defaults: Arc::new(defaults),
        }
    }

    /// Greeting state: resolve the agent, open the conversation and send
    /// the opening batch.
    pub async fn start(&self, session: &mut CallSession) -> Result<(), HandlerError> {
        let identity = session.identity().clone();
        let number = identity.lookup_number();

        tracing::info!(
            call_sid = %identity.call_sid,
            direction = %identity.direction,
            from = %identity.from,
            to = %identity.to,
            "Handling new call"
        );

        let profile = match self.resolve_profile(number).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(call_sid = %identity.call_sid, number, error = %e, "No agent configuration, rejecting call");
                counter!("call_agent_config_failures_total").increment(1);
                return self.reject(session);
            }
        };

        let agent = AgentConfiguration::resolve(&profile, &self.defaults);
        tracing::info!(
            call_sid = %identity.call_sid,
            agent = agent.name.as_deref().unwrap_or("unnamed"),
            model = %agent.model,
            "Agent configuration resolved"
        );

        let conversation = match self.backend.start(&agent.model, &agent.system_prompt).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::error!(call_sid = %identity.call_sid, backend = self.backend.name(), error = %e, "Failed to start conversation");
                counter!("call_agent_backend_failures_total", "op" => "start").increment(1);
                return self.reject(session);
            }
        };

        session.set_conversation(conversation);
        session.register_hook(agent.action_hook.clone(), Arc::new(self.clone()));

        if session.is_terminated() {
            return Ok(());
        }

        let mut opening = CommandBatch::new()
            .answer()
            .pause(self.defaults.answer_pause_secs);

        if identity.direction == CallDirection::Inbound {
            let greeting = match &agent.greeting {
                Some(greeting) => greeting.clone(),
                None => self.generate_greeting(session).await,
            };
            opening = opening.say(greeting, &agent.synthesizer);
        } else {
            tracing::debug!(call_sid = %identity.call_sid, "Outbound call, waiting for the callee");
        }

        let opening = opening.listen(agent.gather_request());
        session.set_agent(agent);

        session.flush(opening)?;
        session.set_state(TurnState::Listening);
        Ok(())
    }

    async fn resolve_profile(&self, number: &str) -> Result<AgentProfile, ConfigResolutionError> {
        if number.is_empty() {
            return Err(ConfigResolutionError::NotFound(number.to_string()));
        }
        self.resolver.resolve(number).await
    }

    /// Apology then hangup; the call never reaches `Listening`
    fn reject(&self, session: &mut CallSession) -> Result<(), HandlerError> {
        let batch = CommandBatch::new()
            .say(
                self.defaults.apology_utterance.clone(),
                &self.defaults.synthesizer(),
            )
            .hangup();

        let sent = session.flush(batch);
        session.set_state(TurnState::Terminated);
        sent.map_err(HandlerError::from)
    }

    async fn generate_greeting(&self, session: &mut CallSession) -> String {
        let request = self.defaults.greeting_request.clone();
        match self.converse(session, &request).await {
            Some(greeting) => greeting,
            None => self.defaults.fallback_utterance.clone(),
        }
    }

    /// One backend exchange; `None` when the backend failed
    async fn converse(&self, session: &mut CallSession, utterance: &str) -> Option<String> {
        let call_sid = session.call_sid().to_string();
        let conversation = session.conversation_mut()?;

        let start = Instant::now();
        let result = self.backend.send(conversation, utterance).await;
        histogram!("call_agent_backend_latency_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(call_sid = %call_sid, backend = self.backend.name(), error = %e, "Backend failed, using fallback");
                counter!("call_agent_backend_failures_total", "op" => "send").increment(1);
                None
            }
        }
    }

    /// Listening state: one hook event from the recognizer
    pub async fn take_turn(
        &self,
        session: &mut CallSession,
        event: HookEvent,
    ) -> Result<(), HandlerError> {
        if session.state() != TurnState::Listening {
            tracing::debug!(call_sid = %session.call_sid(), state = %session.state(), "Hook event outside listening, ignored");
            return Ok(());
        }

        let agent = session
            .agent()
            .cloned()
            .ok_or_else(|| HandlerError::State("listening without agent configuration".into()))?;
        let hook = event.hook.clone().unwrap_or_else(|| agent.action_hook.clone());

        match event.transcript() {
            Some(transcript) => self.respond(session, &agent, &hook, transcript).await,
            None => self.on_silence(session, &agent, &hook),
        }
    }

    async fn respond(
        &self,
        session: &mut CallSession,
        agent: &AgentConfiguration,
        hook: &str,
        transcript: &str,
    ) -> Result<(), HandlerError> {
        let turn = session.record_turn();
        tracing::info!(call_sid = %session.call_sid(), turn, transcript, "User input");

        session.set_state(TurnState::Thinking);
        let reply = self
            .converse(session, transcript)
            .await
            .unwrap_or_else(|| self.defaults.fallback_utterance.clone());

        // The call may have ended while the backend was thinking
        if session.is_terminated() {
            tracing::debug!(call_sid = %session.call_sid(), turn, "Discarding late reply");
            return Ok(());
        }

        tracing::info!(call_sid = %session.call_sid(), turn, reply = %reply, "Agent reply");
        session.set_state(TurnState::Responding);

        let batch = CommandBatch::new()
            .say(reply, &agent.synthesizer)
            .listen(agent.gather_request());
        session.reply(batch, hook)?;

        session.set_state(TurnState::Listening);
        Ok(())
    }

    fn on_silence(
        &self,
        session: &mut CallSession,
        agent: &AgentConfiguration,
        hook: &str,
    ) -> Result<(), HandlerError> {
        let silent = session.record_silence();
        tracing::debug!(call_sid = %session.call_sid(), silent, "No speech detected, listening again");

        if let Some(limit) = self.defaults.max_silence_retries {
            if silent > limit {
                tracing::info!(call_sid = %session.call_sid(), silent, limit, "Too many silent turns, ending call");
                let batch = CommandBatch::new()
                    .say(self.defaults.goodbye_utterance.clone(), &agent.synthesizer)
                    .hangup();
                let sent = session.reply(batch, hook);
                session.set_state(TurnState::Terminated);
                return sent.map_err(HandlerError::from);
            }
        }

        session.reply(CommandBatch::new().listen(agent.gather_request()), hook)?;
        Ok(())
    }
}

#[async_trait]
impl HookHandler for TurnEngine {
    async fn handle(
        &self,
        session: &mut CallSession,
        event: HookEvent,
    ) -> Result<(), HandlerError> {
        self.take_turn(session, event).await
    }
}

#[async_trait]
impl SessionStart for TurnEngine {
    async fn on_session_start(&self, session: &mut CallSession) {
        if let Err(e) = self.start(session).await {
            tracing::error!(call_sid = %session.call_sid(), error = %e, "Failed to start call");
            session.terminate();
        }
    }
}
