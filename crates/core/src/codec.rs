//! Message codec
//!
//! Stateless translation between raw WebSocket payloads and protocol types.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::CodecError;
use crate::protocol::{
    CallDirection, CallIdentity, HookEvent, InboundBody, InboundMessage, MessageId, OutboundFrame,
};

const SESSION_NEW: &str = "session:new";
const VERB_HOOK: &str = "verb:hook";
const SESSION_END: &str = "session:end";

#[derive(Deserialize)]
struct Envelope {
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    msgid: Option<Box<RawValue>>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one inbound message
///
/// Decoding is two-staged: the envelope yields the msgid, then the body is
/// validated. A bad body fails with [`CodecError::InvalidBody`], which still
/// carries the msgid so the caller can acknowledge it.
pub fn decode(raw: &[u8]) -> Result<InboundMessage, CodecError> {
    let envelope: Envelope =
        serde_json::from_slice(raw).map_err(|e| CodecError::malformed(e.to_string()))?;

    let msgid = envelope.msgid.and_then(MessageId::from_raw);

    let kind = match envelope.kind {
        Some(Value::String(kind)) => kind,
        _ => {
            return Err(CodecError::InvalidBody {
                msgid,
                reason: "missing message type".to_string(),
            })
        }
    };

    let body = match kind.as_str() {
        SESSION_NEW => decode_identity(envelope.data).map(InboundBody::SessionAnnounce),
        VERB_HOOK => decode_hook(envelope.data).map(InboundBody::HookEvent),
        SESSION_END => Ok(InboundBody::SessionEnd),
        _ => Ok(InboundBody::Unknown { kind }),
    };

    match body {
        Ok(body) => Ok(InboundMessage { msgid, body }),
        Err(reason) => Err(CodecError::InvalidBody { msgid, reason }),
    }
}

/// Encode one outbound frame as WebSocket text
pub fn encode(frame: &OutboundFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Encode(e.to_string()))
}

fn decode_identity(data: Option<Value>) -> Result<CallIdentity, String> {
    let data = data.ok_or("session:new without data")?;

    let call_sid = data
        .get("call_sid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or("session:new without call_sid")?;

    let text = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(CallIdentity {
        call_sid: call_sid.to_string(),
        direction: CallDirection::from_wire(&text("direction")),
        from: text("from"),
        to: text("to"),
    })
}

fn decode_hook(data: Option<Value>) -> Result<HookEvent, String> {
    let payload = match data {
        Some(value @ Value::Object(_)) => value,
        Some(_) => return Err("verb:hook data is not an object".to_string()),
        None => Value::Object(Default::default()),
    };

    let hook = payload
        .get("hook")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .map(String::from);

    Ok(HookEvent { hook, payload })
}
