//! Spoken confirmations with a capture interlock.
//!
//! Wraps the session's synthesizer handle behind an enable switch. The
//! synthesizer's start/end events drive the Listening <-> Speaking
//! transitions in the session, which is what keeps the device from
//! hearing its own confirmations and dispatching them as commands.

use tracing::warn;

use crate::engine::SpeechSynthesizer;

pub struct SpeechFeedback {
    synthesizer: Box<dyn SpeechSynthesizer>,
    enabled: bool,
}

impl SpeechFeedback {
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>, enabled: bool) -> Self {
        Self {
            synthesizer,
            enabled,
        }
    }

    /// Queue a confirmation. A synthesis failure is logged and swallowed;
    /// a session must never die because feedback audio did.
    pub fn speak(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.synthesizer.speak(text) {
            warn!(error = %e, "speech feedback failed");
        }
    }

    /// Cut off any in-flight playback (session stop path).
    pub fn cancel(&mut self) {
        self.synthesizer.cancel();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VoiceError;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingSynth {
        spoken: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SpeechSynthesizer for RecordingSynth {
        fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
            if self.fail {
                return Err(VoiceError::Synthesis("device gone".to_string()));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn cancel(&mut self) {}
    }

    #[test]
    fn test_speaks_when_enabled() {
        let synth = RecordingSynth::default();
        let spoken = Arc::clone(&synth.spoken);
        let mut feedback = SpeechFeedback::new(Box::new(synth), true);

        feedback.speak("Opening order 3.");
        assert_eq!(spoken.lock().unwrap().as_slice(), ["Opening order 3."]);
    }

    #[test]
    fn test_silent_when_disabled() {
        let synth = RecordingSynth::default();
        let spoken = Arc::clone(&synth.spoken);
        let mut feedback = SpeechFeedback::new(Box::new(synth), false);

        feedback.speak("Opening order 3.");
        assert!(spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_synthesis_failure_is_absorbed() {
        let synth = RecordingSynth {
            fail: true,
            ..Default::default()
        };
        let mut feedback = SpeechFeedback::new(Box::new(synth), true);

        // Must not panic or propagate.
        feedback.speak("Opening order 3.");
    }
}
