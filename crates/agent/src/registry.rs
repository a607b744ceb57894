//! Session registry
//!
//! Tracks live call connections and routes their inbound messages.
//!
//! ```text
//!   socket reader ──decode──▶ ack ──▶ route ─┬─ session:new ─▶ spawn worker + Start
//!                                            ├─ verb:hook ───▶ worker queue
//!                                            └─ session:end ─▶ terminate link
//!
//!   worker (one per call): Start / Hook events, strictly one at a time
//! ```
//!
//! Acks are written by the reader before the event reaches the worker, so
//! they never wait on handler latency. Termination is recorded on the shared
//! link from the reader side, which is what makes late backend replies in
//! the worker fall on the floor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use call_agent_core::{
    codec, CallDirection, CallIdentity, FrameSink, HookEvent, InboundBody, MessageId,
};

use crate::hooks;
use crate::link::CallLink;
use crate::session::CallSession;
use crate::AgentError;

/// Invoked once per call when the session is announced
#[async_trait]
pub trait SessionStart: Send + Sync {
    async fn on_session_start(&self, session: &mut CallSession);
}

/// Work item for a session worker
#[derive(Debug)]
enum SessionEvent {
    Start,
    Hook(HookEvent),
}

/// Live connection entry, keyed by connection id
#[derive(Debug)]
struct LiveCall {
    call_sid: Option<String>,
    direction: Option<CallDirection>,
    connected_at: Instant,
}

impl LiveCall {
    fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

pub struct SessionRegistry {
    calls: RwLock<HashMap<Uuid, LiveCall>>,
    starter: Arc<dyn SessionStart>,
    max_calls: usize,
}

impl SessionRegistry {
    pub fn new(starter: Arc<dyn SessionStart>, max_calls: usize) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            starter,
            max_calls,
        }
    }

    /// Admit a new connection
    pub fn on_connect(self: &Arc<Self>, link: CallLink) -> Result<CallConnection, AgentError> {
        let id = Uuid::new_v4();
        {
            let mut calls = self.calls.write();
            if calls.len() >= self.max_calls {
                counter!("call_agent_connections_rejected_total").increment(1);
                return Err(AgentError::AtCapacity(self.max_calls));
            }
            calls.insert(
                id,
                LiveCall {
                    call_sid: None,
                    direction: None,
                    connected_at: Instant::now(),
                },
            );
        }

        tracing::debug!(connection_id = %id, "Call-control connection opened");
        counter!("call_agent_connections_total").increment(1);

        Ok(CallConnection {
            id,
            registry: Arc::clone(self),
            link,
            events: None,
            call_sid: None,
        })
    }

    pub fn active_calls(&self) -> usize {
        self.calls.read().len()
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn is_full(&self) -> bool {
        self.active_calls() >= self.max_calls
    }

    fn record_identity(&self, id: Uuid, identity: &CallIdentity) {
        if let Some(call) = self.calls.write().get_mut(&id) {
            call.call_sid = Some(identity.call_sid.clone());
            call.direction = Some(identity.direction);
        }
    }

    fn remove(&self, id: Uuid) -> Option<LiveCall> {
        self.calls.write().remove(&id)
    }
}

/// Reader side of one call-control connection
///
/// Dropping it is the disconnect: the link is terminated and the registry
/// entry removed.
pub struct CallConnection {
    id: Uuid,
    registry: Arc<SessionRegistry>,
    link: CallLink,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    call_sid: Option<String>,
}

impl CallConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    /// Handle one raw inbound message: decode, ack, route
    pub fn on_message(&mut self, raw: &[u8]) {
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.id,
                    call_sid = self.call_sid.as_deref().unwrap_or("-"),
                    error = %e,
                    "Dropping malformed message"
                );
                counter!("call_agent_decode_errors_total").increment(1);
                if let Some(msgid) = e.msgid().cloned() {
                    self.acknowledge(msgid);
                }
                return;
            }
        };

        if let Some(msgid) = message.msgid {
            self.acknowledge(msgid);
        }

        match message.body {
            InboundBody::SessionAnnounce(identity) => self.announce(identity),
            InboundBody::HookEvent(event) => self.forward(event),
            InboundBody::SessionEnd => self.end(),
            InboundBody::Unknown { kind } => {
                tracing::debug!(connection_id = %self.id, kind = %kind, "Ignoring unknown message type");
            }
        }
    }

    fn acknowledge(&self, msgid: MessageId) {
        if let Err(e) = self.link.acknowledge(msgid) {
            tracing::debug!(connection_id = %self.id, error = %e, "Ack not delivered");
        }
    }

    fn announce(&mut self, identity: CallIdentity) {
        if self.call_sid.is_some() {
            tracing::debug!(
                connection_id = %self.id,
                call_sid = %identity.call_sid,
                "Repeated session announcement ignored"
            );
            return;
        }

        tracing::info!(
            connection_id = %self.id,
            call_sid = %identity.call_sid,
            direction = %identity.direction,
            "Session new"
        );
        counter!("call_agent_calls_started_total", "direction" => identity.direction.as_str())
            .increment(1);

        self.registry.record_identity(self.id, &identity);
        self.call_sid = Some(identity.call_sid.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let session = CallSession::new(identity, Arc::new(self.link.clone()));
        tokio::spawn(run_session(session, Arc::clone(&self.registry.starter), rx));

        let _ = tx.send(SessionEvent::Start);
        self.events = Some(tx);
    }

    fn forward(&mut self, event: HookEvent) {
        match &self.events {
            Some(events) => {
                if events.send(SessionEvent::Hook(event)).is_err() {
                    tracing::debug!(connection_id = %self.id, "Session worker gone, hook event dropped");
                }
            }
            None => {
                tracing::warn!(
                    connection_id = %self.id,
                    hook = event.hook.as_deref().unwrap_or("-"),
                    "Hook event without an active session, dropped"
                );
            }
        }
    }

    fn end(&mut self) {
        tracing::info!(
            connection_id = %self.id,
            call_sid = self.call_sid.as_deref().unwrap_or("-"),
            "Session end"
        );
        self.link.terminate();
        self.events = None;
    }

    /// Transport closed
    pub fn on_disconnect(self) {
        tracing::debug!(
            connection_id = %self.id,
            call_sid = self.call_sid.as_deref().unwrap_or("-"),
            "Call-control connection closed"
        );
    }
}

impl Drop for CallConnection {
    fn drop(&mut self) {
        self.link.terminate();
        self.events = None;

        if let Some(call) = self.registry.remove(self.id) {
            if call.call_sid.is_some() {
                counter!("call_agent_calls_ended_total").increment(1);
            }
            tracing::debug!(
                connection_id = %self.id,
                call_sid = call.call_sid.as_deref().unwrap_or("-"),
                direction = call.direction.map(|d| d.as_str()).unwrap_or("-"),
                duration_ms = call.age().as_millis() as u64,
                "Connection released"
            );
        }
    }
}

/// Per-call worker: processes session events one at a time
async fn run_session(
    mut session: CallSession,
    starter: Arc<dyn SessionStart>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Start => starter.on_session_start(&mut session).await,
            SessionEvent::Hook(event) => hooks::dispatch(&mut session, event).await,
        }
    }

    tracing::debug!(
        call_sid = %session.call_sid(),
        state = %session.state(),
        turns = session.turns(),
        "Session worker finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::FrameReceiver;
    use call_agent_core::OutboundFrame;
    use parking_lot::Mutex;

    /// Records announced call ids
    #[derive(Default)]
    struct RecordingStarter {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionStart for RecordingStarter {
        async fn on_session_start(&self, session: &mut CallSession) {
            self.started.lock().push(session.call_sid().to_string());
        }
    }

    fn registry(max_calls: usize) -> (Arc<SessionRegistry>, Arc<RecordingStarter>) {
        let starter = Arc::new(RecordingStarter::default());
        let registry = Arc::new(SessionRegistry::new(starter.clone(), max_calls));
        (registry, starter)
    }

    fn connect(registry: &Arc<SessionRegistry>) -> (CallConnection, FrameReceiver) {
        let (link, rx) = CallLink::channel();
        (registry.on_connect(link).unwrap(), rx)
    }

    const ANNOUNCE: &[u8] = br#"{"type":"session:new","msgid":"m1","data":{"call_sid":"CA1","direction":"inbound","from":"+905551112233","to":"+908501234567"}}"#;

    #[tokio::test]
    async fn test_capacity_limit() {
        let (registry, _) = registry(1);
        let (first, _rx) = connect(&registry);

        let (link, _rx2) = CallLink::channel();
        assert!(matches!(
            registry.on_connect(link),
            Err(AgentError::AtCapacity(1))
        ));
        assert!(registry.is_full());

        first.on_disconnect();
        assert_eq!(registry.active_calls(), 0);
        let (link, _rx3) = CallLink::channel();
        assert!(registry.on_connect(link).is_ok());
    }

    #[tokio::test]
    async fn test_announce_once() {
        let (registry, starter) = registry(10);
        let (mut conn, mut rx) = connect(&registry);

        conn.on_message(ANNOUNCE);
        conn.on_message(
            br#"{"type":"session:new","msgid":"m2","data":{"call_sid":"CA2","direction":"outbound"}}"#,
        );
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*starter.started.lock(), vec!["CA1".to_string()]);
        assert_eq!(conn.call_sid(), Some("CA1"));
        {
            let calls = registry.calls.read();
            let call = calls.get(&conn.id()).unwrap();
            assert_eq!(call.call_sid.as_deref(), Some("CA1"));
            assert_eq!(call.direction, Some(CallDirection::Inbound));
        }

        // Both announcements are acknowledged
        assert_eq!(rx.try_recv().unwrap(), vec![OutboundFrame::ack(MessageId::from_string("m1"))]);
        assert_eq!(rx.try_recv().unwrap(), vec![OutboundFrame::ack(MessageId::from_string("m2"))]);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages() {
        let (registry, starter) = registry(10);
        let (mut conn, mut rx) = connect(&registry);

        conn.on_message(b"{not json");
        conn.on_message(br#"{"type":"call:status","msgid":"m9","data":{}}"#);
        conn.on_message(br#"{"type":"verb:hook","msgid":"m10","data":{"hook":"/onSpeech"}}"#);

        assert_eq!(rx.try_recv().unwrap(), vec![OutboundFrame::ack(MessageId::from_string("m9"))]);
        assert_eq!(rx.try_recv().unwrap(), vec![OutboundFrame::ack(MessageId::from_string("m10"))]);
        assert!(rx.try_recv().is_err());
        assert!(starter.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_bodies_are_still_acked() {
        let (registry, starter) = registry(10);
        let (mut conn, mut rx) = connect(&registry);

        conn.on_message(br#"{"type":"session:new","msgid":"m1","data":{"direction":"inbound"}}"#);
        conn.on_message(br#"{"type":"verb:hook","msgid":"m2","data":"oops"}"#);
        conn.on_message(br#"{"msgid":"m3"}"#);

        let mut acks = Vec::new();
        while let Ok(frames) = rx.try_recv() {
            acks.extend(frames);
        }
        assert_eq!(
            acks,
            vec![
                OutboundFrame::ack(MessageId::from_string("m1")),
                OutboundFrame::ack(MessageId::from_string("m2")),
                OutboundFrame::ack(MessageId::from_string("m3")),
            ]
        );

        // Nothing was routed
        assert!(conn.call_sid().is_none());
        tokio::task::yield_now().await;
        assert!(starter.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_session_end_terminates_link() {
        let (registry, _) = registry(10);
        let (link, mut rx) = CallLink::channel();
        let reader_side = link.clone();
        let mut conn = registry.on_connect(link).unwrap();

        conn.on_message(ANNOUNCE);
        conn.on_message(br#"{"type":"session:end","msgid":"m3"}"#);

        assert!(reader_side.is_terminated());
        let mut acks = Vec::new();
        while let Ok(frames) = rx.try_recv() {
            acks.extend(frames);
        }
        assert_eq!(acks.last(), Some(&OutboundFrame::ack(MessageId::from_string("m3"))));

        // Entry stays until the socket actually closes
        assert_eq!(registry.active_calls(), 1);
        drop(conn);
        assert_eq!(registry.active_calls(), 0);
    }
}
