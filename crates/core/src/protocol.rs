//! Call-control protocol types
//!
//! Inbound messages from the telephony platform and outbound frames sent
//! back over the same connection.

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

use crate::verb::Verb;

/// Message identifier that must be echoed back in an acknowledgement.
///
/// Kept as the raw JSON text received so the ack carries it byte-for-byte.
#[derive(Clone)]
pub struct MessageId(Box<RawValue>);

impl MessageId {
    /// Only truthy identifiers are acknowledged: `null`, `false`, `0` and
    /// `""` count as absent.
    pub(crate) fn from_raw(raw: Box<RawValue>) -> Option<Self> {
        let absent = match serde_json::from_str::<serde_json::Value>(raw.get()) {
            Ok(serde_json::Value::Null) | Ok(serde_json::Value::Bool(false)) => true,
            Ok(serde_json::Value::String(s)) => s.is_empty(),
            Ok(serde_json::Value::Number(n)) => n.as_f64() == Some(0.0),
            _ => false,
        };
        if absent {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Build an identifier from a string value
    pub fn from_string(id: impl AsRef<str>) -> Self {
        Self(serde_json::value::to_raw_value(id.as_ref()).unwrap_or_default())
    }

    /// Raw JSON text of the identifier, exactly as received
    pub fn raw(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl Eq for MessageId {}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.raw())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Call direction as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Caller dialled one of our numbers; the agent speaks first
    Inbound,
    /// We placed the call; the called party speaks first
    Outbound,
}

impl CallDirection {
    /// Anything other than `inbound` is handled as an outbound call
    pub fn from_wire(value: &str) -> Self {
        if value.eq_ignore_ascii_case("inbound") {
            CallDirection::Inbound
        } else {
            CallDirection::Outbound
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a call, announced once per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    pub call_sid: String,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
}

impl CallIdentity {
    /// Number used to look up the agent profile: our own side of the call
    pub fn lookup_number(&self) -> &str {
        match self.direction {
            CallDirection::Inbound => &self.to,
            CallDirection::Outbound => &self.from,
        }
    }
}

/// Outcome reported by the platform for a previously issued verb
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    /// Hook identifier, either a full URL or a bare path
    pub hook: Option<String>,
    /// The whole `data` object of the message
    pub payload: serde_json::Value,
}

impl HookEvent {
    pub fn new(hook: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            hook: Some(hook.into()),
            payload,
        }
    }

    /// First recognition alternative, if it contains any non-blank text
    pub fn transcript(&self) -> Option<&str> {
        self.payload
            .get("speech")
            .and_then(|s| s.get("alternatives"))
            .and_then(|a| a.get(0))
            .and_then(|alt| alt.get("transcript"))
            .and_then(|t| t.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Decoded body of an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    /// `session:new`
    SessionAnnounce(CallIdentity),
    /// `verb:hook`
    HookEvent(HookEvent),
    /// `session:end`
    SessionEnd,
    /// Any other message type; acknowledged and ignored
    Unknown { kind: String },
}

impl InboundBody {
    pub fn kind(&self) -> &str {
        match self {
            InboundBody::SessionAnnounce(_) => "session:new",
            InboundBody::HookEvent(_) => "verb:hook",
            InboundBody::SessionEnd => "session:end",
            InboundBody::Unknown { kind } => kind,
        }
    }
}

/// Inbound message with its optional acknowledgement id
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub msgid: Option<MessageId>,
    pub body: InboundBody,
}

/// Frame sent to the platform
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Acknowledgement of an inbound message
    Ack { msgid: MessageId },
    /// One call-control verb
    Command(Verb),
}

impl OutboundFrame {
    pub fn ack(msgid: MessageId) -> Self {
        OutboundFrame::Ack { msgid }
    }

    pub fn command(verb: Verb) -> Self {
        OutboundFrame::Command(verb)
    }

    /// The verb carried by a command frame
    pub fn verb(&self) -> Option<&Verb> {
        match self {
            OutboundFrame::Command(verb) => Some(verb),
            OutboundFrame::Ack { .. } => None,
        }
    }
}
