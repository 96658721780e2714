//! Simulated voice platform for the CLI binary.
//!
//! Typed lines stand in for final transcripts, synthesized speech is
//! printed, and the capture track reports its mute state. This exists so
//! the whole engine can be exercised without audio hardware; there is no
//! engine logic here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::engine::{AudioTrack, SpeechRecognizer, SpeechSynthesizer, VoiceError, VoicePlatform};
use crate::session::EventSender;

#[derive(Default)]
struct Shared {
    events: Mutex<Option<EventSender>>,
    running: AtomicBool,
    mic_enabled: AtomicBool,
}

/// Platform whose "recognizer" is fed typed lines via [`submit_line`].
///
/// [`submit_line`]: ConsolePlatform::submit_line
#[derive(Default)]
pub struct ConsolePlatform {
    shared: Arc<Shared>,
}

impl ConsolePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one typed line in as if the recognizer heard it. Lines are
    /// dropped the way a real microphone would drop them: when no
    /// session is listening, or while the track is muted for playback.
    pub fn submit_line(&self, line: &str) {
        if !self.shared.running.load(Ordering::SeqCst) {
            println!("(not listening - type :toggle to start)");
            return;
        }
        if !self.shared.mic_enabled.load(Ordering::SeqCst) {
            println!("(mic muted for playback, ignored)");
            return;
        }
        if let Some(events) = self.shared.events.lock().unwrap().as_ref() {
            events.final_transcript(line);
        }
    }
}

impl VoicePlatform for ConsolePlatform {
    fn open_microphone(&self) -> Result<Box<dyn AudioTrack>, VoiceError> {
        self.shared.mic_enabled.store(true, Ordering::SeqCst);
        Ok(Box::new(ConsoleTrack {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn create_recognizer(
        &self,
        vocabulary: &[String],
        events: EventSender,
    ) -> Result<Box<dyn SpeechRecognizer>, VoiceError> {
        debug!(words = vocabulary.len(), "console recognizer created");
        *self.shared.events.lock().unwrap() = Some(events);
        Ok(Box::new(ConsoleRecognizer {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn create_synthesizer(
        &self,
        events: EventSender,
    ) -> Result<Box<dyn SpeechSynthesizer>, VoiceError> {
        Ok(Box::new(ConsoleSynthesizer { events }))
    }
}

struct ConsoleTrack {
    shared: Arc<Shared>,
}

impl AudioTrack for ConsoleTrack {
    fn set_enabled(&mut self, enabled: bool) {
        self.shared.mic_enabled.store(enabled, Ordering::SeqCst);
        debug!(enabled, "console mic track");
    }

    fn is_enabled(&self) -> bool {
        self.shared.mic_enabled.load(Ordering::SeqCst)
    }
}

impl Drop for ConsoleTrack {
    fn drop(&mut self) {
        self.shared.mic_enabled.store(false, Ordering::SeqCst);
    }
}

struct ConsoleRecognizer {
    shared: Arc<Shared>,
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self) -> Result<(), VoiceError> {
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConsoleRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ConsoleSynthesizer {
    events: EventSender,
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
        println!("[say] {}", text);
        self.events.speech_started();
        // Pretend playback takes time so the mute interlock is visible.
        let words = text.split_whitespace().count() as u64;
        let events = self.events.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(150 + 40 * words));
            events.speech_ended(false);
        });
        Ok(())
    }

    fn cancel(&mut self) {}
}
