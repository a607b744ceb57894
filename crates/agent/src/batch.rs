//! Command batch builder
//!
//! A `CommandBatch` is an ordered list of verbs built by chaining and then
//! consumed by `CallSession::flush` or `CallSession::reply`. Every builder
//! call takes the batch by value, so a batch can only be sent once.

use call_agent_core::{GatherRequest, OutboundFrame, RecognizerConfig, SynthesizerConfig, Verb};

#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a command batch does nothing until it is flushed"]
pub struct CommandBatch {
    verbs: Vec<Verb>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self) -> Self {
        self.push(Verb::Answer)
    }

    pub fn pause(self, seconds: f64) -> Self {
        self.push(Verb::Pause { length: seconds })
    }

    pub fn say(self, text: impl Into<String>, synthesizer: &SynthesizerConfig) -> Self {
        self.push(Verb::Say {
            text: text.into(),
            synthesizer: synthesizer.clone(),
        })
    }

    pub fn gather(
        self,
        recognizer: &RecognizerConfig,
        timeout_secs: u32,
        action_hook: impl Into<String>,
    ) -> Self {
        self.listen(GatherRequest::speech(
            recognizer.clone(),
            timeout_secs,
            action_hook,
        ))
    }

    /// Append a prepared recognition request
    pub fn listen(self, request: GatherRequest) -> Self {
        self.push(Verb::Gather(request))
    }

    /// Verbs queued after a hangup are kept; the platform ends the call
    /// before reaching them.
    pub fn hangup(self) -> Self {
        self.push(Verb::Hangup)
    }

    pub fn push(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn ends_call(&self) -> bool {
        self.verbs.iter().any(Verb::is_hangup)
    }

    /// Verb names joined for logging, e.g. `say,gather`
    pub fn summary(&self) -> String {
        self.verbs
            .iter()
            .map(Verb::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// One command frame per verb, in enqueue order
    pub fn into_frames(self) -> Vec<OutboundFrame> {
        self.verbs.into_iter().map(OutboundFrame::command).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> SynthesizerConfig {
        SynthesizerConfig {
            vendor: "elevenlabs".into(),
            label: "tts".into(),
            language: "tr-TR".into(),
            voice: "Rachel".into(),
        }
    }

    fn recognizer() -> RecognizerConfig {
        RecognizerConfig {
            vendor: "deepgram".into(),
            label: "stt".into(),
            language: "tr-TR".into(),
            interim_results: true,
            punctuation: true,
        }
    }

    #[test]
    fn test_chaining_preserves_order() {
        let batch = CommandBatch::new()
            .answer()
            .pause(0.5)
            .say("Merhaba", &synthesizer())
            .gather(&recognizer(), 5, "/onSpeech");

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.summary(), "answer,pause,say,gather");
        assert!(!batch.ends_call());

        let frames = batch.into_frames();
        let names: Vec<_> = frames
            .iter()
            .filter_map(|f| f.verb().map(Verb::name))
            .collect();
        assert_eq!(names, vec!["answer", "pause", "say", "gather"]);
    }

    #[test]
    fn test_verbs_after_hangup_still_append() {
        let batch = CommandBatch::new()
            .hangup()
            .say("ignored by the platform", &synthesizer());

        assert!(batch.ends_call());
        assert_eq!(batch.summary(), "hangup,say");
    }

    #[test]
    fn test_empty_batch() {
        let batch = CommandBatch::new();
        assert!(batch.is_empty());
        assert!(batch.into_frames().is_empty());
    }

    #[test]
    fn test_gather_carries_hook_and_timeout() {
        let batch = CommandBatch::new().gather(&recognizer(), 7, "/onSpeech");
        match &batch.verbs()[0] {
            Verb::Gather(request) => {
                assert_eq!(request.timeout, 7);
                assert_eq!(request.action_hook, "/onSpeech");
                assert_eq!(request.recognizer, recognizer());
            }
            other => panic!("unexpected verb: {:?}", other),
        }
    }
}
