//! Call-control verbs
//!
//! A verb is a single instruction executed by the telephony platform.
//! Verbs are immutable once built and serialize to the
//! `{"command": <name>, "data": <params>}` part of a command frame.

use serde::{Deserialize, Serialize};

/// Speech recognizer settings carried by every `gather`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerConfig {
    pub vendor: String,
    pub label: String,
    pub language: String,
    pub interim_results: bool,
    pub punctuation: bool,
}

/// Speech synthesizer settings carried by every `say`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    pub vendor: String,
    pub label: String,
    pub language: String,
    pub voice: String,
}

/// Parameters of a `gather` verb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherRequest {
    pub input: Vec<String>,
    /// Seconds of silence before the platform reports an empty result
    pub timeout: u32,
    pub recognizer: RecognizerConfig,
    pub action_hook: String,
}

impl GatherRequest {
    /// Speech-only gather
    pub fn speech(
        recognizer: RecognizerConfig,
        timeout: u32,
        action_hook: impl Into<String>,
    ) -> Self {
        Self {
            input: vec!["speech".to_string()],
            timeout,
            recognizer,
            action_hook: action_hook.into(),
        }
    }
}

/// A single call-control instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "data", rename_all = "lowercase")]
pub enum Verb {
    Answer,
    Pause {
        /// Seconds
        length: f64,
    },
    Say {
        text: String,
        synthesizer: SynthesizerConfig,
    },
    Gather(GatherRequest),
    Hangup,
}

impl Verb {
    /// Wire name of the verb
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Answer => "answer",
            Verb::Pause { .. } => "pause",
            Verb::Say { .. } => "say",
            Verb::Gather(_) => "gather",
            Verb::Hangup => "hangup",
        }
    }

    pub fn is_hangup(&self) -> bool {
        matches!(self, Verb::Hangup)
    }
}
