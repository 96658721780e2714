//! Capability seams for the platform speech engines.
//!
//! The session controller never talks to a concrete recognizer or
//! synthesizer; it is handed a [`VoicePlatform`] at construction and asks
//! it for handles when a session starts. Engines report back through the
//! [`EventSender`](crate::session::EventSender) facade, which posts into
//! the session's event loop; engine callbacks never transition state
//! in-line.

use thiserror::Error;

use crate::session::EventSender;

/// Failures crossing the capability boundary.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("recognition engine failed to initialize: {0}")]
    EngineInit(String),

    #[error("recognition engine failed to start: {0}")]
    EngineStart(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Error kinds a running recognizer can report. Only permission denial is
/// fatal; everything else is a normal hazard of long-lived listening and
/// triggers an internal restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    Network,
    PermissionDenied,
    Device,
}

impl RecognitionErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, RecognitionErrorKind::PermissionDenied)
    }

    pub fn describe(self) -> &'static str {
        match self {
            RecognitionErrorKind::NoSpeech => "no speech detected",
            RecognitionErrorKind::Aborted => "recognition aborted",
            RecognitionErrorKind::Network => "network error during recognition",
            RecognitionErrorKind::PermissionDenied => "microphone permission denied",
            RecognitionErrorKind::Device => "audio device error",
        }
    }
}

/// A live microphone capture track. Muting disables the track without
/// tearing the stream down, so capture resumes instantly on unmute.
/// Dropping the track releases the device.
pub trait AudioTrack: Send {
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

/// A recognizer created for one session with a fixed vocabulary.
///
/// Contract: transcripts and errors are posted through the `EventSender`
/// the engine was created with, and only between `start` and `stop`.
/// `stop` must be silent - adapters absorb any end event their platform
/// fires after an explicit stop, and `engine_ended` is reserved for
/// spontaneous ends (platform timeouts). `stop` on a stopped engine is a
/// no-op. Dropping the handle releases the engine.
pub trait SpeechRecognizer: Send {
    fn start(&mut self) -> Result<(), VoiceError>;
    fn stop(&mut self);
}

/// A speech-synthesis channel for one session.
///
/// Contract: once `speak` returns `Ok`, the engine posts `speech_started`
/// when audio actually begins and `speech_ended` when it finishes or
/// fails - the ended event must fire on error paths too, since the
/// session keeps capture muted until it arrives.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, text: &str) -> Result<(), VoiceError>;
    fn cancel(&mut self);
}

/// Factory for the platform's speech capabilities, injected once at
/// controller creation. Capability detection (which concrete engines
/// exist on this device) happens in the caller before construction.
pub trait VoicePlatform: Send + Sync {
    fn open_microphone(&self) -> Result<Box<dyn AudioTrack>, VoiceError>;

    fn create_recognizer(
        &self,
        vocabulary: &[String],
        events: EventSender,
    ) -> Result<Box<dyn SpeechRecognizer>, VoiceError>;

    fn create_synthesizer(
        &self,
        events: EventSender,
    ) -> Result<Box<dyn SpeechSynthesizer>, VoiceError>;
}
