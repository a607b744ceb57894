//! Agent profile and turn defaults
//!
//! `AgentProfile` is what the configuration backend returns for a phone
//! number; every field is optional. `AgentConfiguration` is the resolved,
//! immutable per-call view, where each missing field falls back to its own
//! entry in `TurnDefaults`.

use serde::{Deserialize, Serialize};

use crate::verb::{GatherRequest, RecognizerConfig, SynthesizerConfig};

/// Agent profile as served by the configuration backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub llm: Option<LlmProfile>,
    #[serde(default)]
    pub stt: Option<RecognizerProfile>,
    #[serde(default)]
    pub tts: Option<SynthesizerProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmProfile {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerProfile {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizerProfile {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, alias = "voice")]
    pub voice_id: Option<String>,
}

/// Fixed defaults and utterances used by the turn engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDefaults {
    #[serde(default = "default_gather_timeout")]
    pub gather_timeout_secs: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_recognizer_vendor")]
    pub recognizer_vendor: String,
    #[serde(default = "default_recognizer_label")]
    pub recognizer_label: String,
    #[serde(default = "default_true")]
    pub interim_results: bool,
    #[serde(default = "default_true")]
    pub punctuation: bool,
    #[serde(default = "default_synthesizer_vendor")]
    pub synthesizer_vendor: String,
    #[serde(default = "default_synthesizer_label")]
    pub synthesizer_label: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Hook the platform calls with recognition results
    #[serde(default = "default_action_hook")]
    pub action_hook: String,
    /// Pause after answering, before the first prompt
    #[serde(default = "default_answer_pause")]
    pub answer_pause_secs: f64,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Spoken when the conversational backend fails
    #[serde(default = "default_fallback_utterance")]
    pub fallback_utterance: String,
    /// Spoken before hanging up when the call cannot be configured
    #[serde(default = "default_apology_utterance")]
    pub apology_utterance: String,
    /// Spoken before hanging up after too many silent turns
    #[serde(default = "default_goodbye_utterance")]
    pub goodbye_utterance: String,
    /// Prompt used to generate a greeting when the profile has none
    #[serde(default = "default_greeting_request")]
    pub greeting_request: String,
    /// Consecutive silent gathers tolerated before hanging up; `None` is unbounded
    #[serde(default)]
    pub max_silence_retries: Option<u32>,
}

fn default_gather_timeout() -> u32 {
    5
}
fn default_language() -> String {
    "tr-TR".to_string()
}
fn default_recognizer_vendor() -> String {
    "deepgram".to_string()
}
fn default_recognizer_label() -> String {
    "stt".to_string()
}
fn default_synthesizer_vendor() -> String {
    "elevenlabs".to_string()
}
fn default_synthesizer_label() -> String {
    "tts".to_string()
}
fn default_voice() -> String {
    "Rachel".to_string()
}
fn default_action_hook() -> String {
    "/onSpeech".to_string()
}
fn default_answer_pause() -> f64 {
    0.5
}
fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_fallback_utterance() -> String {
    "I'm sorry, I couldn't hear you".to_string()
}
fn default_apology_utterance() -> String {
    "Configuration error. Please contact your administrator.".to_string()
}
fn default_goodbye_utterance() -> String {
    "I can't hear you, so I'll end the call now. Goodbye.".to_string()
}
fn default_greeting_request() -> String {
    "The call has started. Say a short, natural opening sentence that fits your role."
        .to_string()
}
fn default_true() -> bool {
    true
}

impl Default for TurnDefaults {
    fn default() -> Self {
        Self {
            gather_timeout_secs: default_gather_timeout(),
            language: default_language(),
            recognizer_vendor: default_recognizer_vendor(),
            recognizer_label: default_recognizer_label(),
            interim_results: true,
            punctuation: true,
            synthesizer_vendor: default_synthesizer_vendor(),
            synthesizer_label: default_synthesizer_label(),
            voice: default_voice(),
            action_hook: default_action_hook(),
            answer_pause_secs: default_answer_pause(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            fallback_utterance: default_fallback_utterance(),
            apology_utterance: default_apology_utterance(),
            goodbye_utterance: default_goodbye_utterance(),
            greeting_request: default_greeting_request(),
            max_silence_retries: None,
        }
    }
}

impl TurnDefaults {
    /// Synthesizer used when no profile is available (e.g. the apology)
    pub fn synthesizer(&self) -> SynthesizerConfig {
        SynthesizerConfig {
            vendor: self.synthesizer_vendor.clone(),
            label: self.synthesizer_label.clone(),
            language: self.language.clone(),
            voice: self.voice.clone(),
        }
    }
}

/// Resolved agent configuration, fixed for the lifetime of a call
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfiguration {
    pub name: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub greeting: Option<String>,
    pub recognizer: RecognizerConfig,
    pub synthesizer: SynthesizerConfig,
    pub gather_timeout_secs: u32,
    pub action_hook: String,
}

fn pick(value: Option<&String>, fallback: &str) -> String {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl AgentConfiguration {
    /// Resolve a profile against the defaults, field by field
    pub fn resolve(profile: &AgentProfile, defaults: &TurnDefaults) -> Self {
        let llm = profile.llm.clone().unwrap_or_default();
        let stt = profile.stt.clone().unwrap_or_default();
        let tts = profile.tts.clone().unwrap_or_default();

        Self {
            name: profile.name.clone(),
            model: pick(llm.model.as_ref(), &defaults.model),
            system_prompt: pick(llm.system_prompt.as_ref(), &defaults.system_prompt),
            greeting: profile
                .greeting
                .as_ref()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty()),
            recognizer: RecognizerConfig {
                vendor: pick(stt.vendor.as_ref(), &defaults.recognizer_vendor),
                label: pick(stt.label.as_ref(), &defaults.recognizer_label),
                language: pick(stt.language.as_ref(), &defaults.language),
                interim_results: defaults.interim_results,
                punctuation: defaults.punctuation,
            },
            synthesizer: SynthesizerConfig {
                vendor: pick(tts.vendor.as_ref(), &defaults.synthesizer_vendor),
                label: pick(tts.label.as_ref(), &defaults.synthesizer_label),
                language: pick(tts.language.as_ref(), &defaults.language),
                voice: pick(tts.voice_id.as_ref(), &defaults.voice),
            },
            gather_timeout_secs: defaults.gather_timeout_secs,
            action_hook: defaults.action_hook.clone(),
        }
    }

    /// Recognition request re-armed after every turn
    pub fn gather_request(&self) -> GatherRequest {
        GatherRequest::speech(
            self.recognizer.clone(),
            self.gather_timeout_secs,
            self.action_hook.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile_uses_defaults() {
        let defaults = TurnDefaults::default();
        let agent = AgentConfiguration::resolve(&AgentProfile::default(), &defaults);

        assert_eq!(agent.model, "gemini-2.0-flash-exp");
        assert_eq!(agent.recognizer.vendor, "deepgram");
        assert_eq!(agent.recognizer.language, "tr-TR");
        assert!(agent.recognizer.interim_results);
        assert!(agent.recognizer.punctuation);
        assert_eq!(agent.synthesizer.vendor, "elevenlabs");
        assert_eq!(agent.synthesizer.voice, "Rachel");
        assert_eq!(agent.gather_timeout_secs, 5);
        assert!(agent.greeting.is_none());
    }

    #[test]
    fn test_defaulting_is_per_field() {
        let profile: AgentProfile = serde_json::from_value(serde_json::json!({
            "name": "Support",
            "greeting": "Hoş geldiniz",
            "llm": { "systemPrompt": "You are a support agent." },
            "stt": { "vendor": "google" },
            "tts": { "voiceId": "Adam", "language": "en-US" }
        }))
        .unwrap();

        let agent = AgentConfiguration::resolve(&profile, &TurnDefaults::default());

        assert_eq!(agent.system_prompt, "You are a support agent.");
        assert_eq!(agent.model, "gemini-2.0-flash-exp");
        assert_eq!(agent.recognizer.vendor, "google");
        assert_eq!(agent.recognizer.label, "stt");
        assert_eq!(agent.synthesizer.voice, "Adam");
        assert_eq!(agent.synthesizer.language, "en-US");
        assert_eq!(agent.synthesizer.vendor, "elevenlabs");
        assert_eq!(agent.greeting.as_deref(), Some("Hoş geldiniz"));
    }

    #[test]
    fn test_blank_fields_fall_back() {
        let profile = AgentProfile {
            greeting: Some("   ".into()),
            llm: Some(LlmProfile {
                model: Some(String::new()),
                system_prompt: None,
            }),
            ..Default::default()
        };
        let agent = AgentConfiguration::resolve(&profile, &TurnDefaults::default());
        assert!(agent.greeting.is_none());
        assert_eq!(agent.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_gather_request_from_configuration() {
        let defaults = TurnDefaults {
            gather_timeout_secs: 8,
            action_hook: "/speech".into(),
            ..Default::default()
        };
        let agent = AgentConfiguration::resolve(&AgentProfile::default(), &defaults);
        let gather = agent.gather_request();

        assert_eq!(gather.timeout, 8);
        assert_eq!(gather.action_hook, "/speech");
        assert_eq!(gather.input, vec!["speech".to_string()]);
    }

    #[test]
    fn test_defaults_deserialize_partially() {
        let defaults: TurnDefaults =
            serde_json::from_value(serde_json::json!({ "max_silence_retries": 3 })).unwrap();
        assert_eq!(defaults.max_silence_retries, Some(3));
        assert_eq!(defaults.gather_timeout_secs, 5);
        assert_eq!(defaults.voice, "Rachel");
    }
}
