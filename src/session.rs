//! Voice session controller - the state machine coordinating microphone
//! capture, the recognition engine, spoken feedback, and cleanup.
//!
//! All session state lives on a single event-loop thread draining one
//! channel, so transitions are serialized by construction: a handler runs
//! to completion, resource work included, before the next event is seen.
//! Engine callbacks and timers only post messages; nothing transitions
//! state from a nested callback frame.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::{CommandDispatcher, Navigator, RecognitionResult, ResultKind};
use crate::config::Config;
use crate::engine::{
    AudioTrack, RecognitionErrorKind, SpeechRecognizer, SpeechSynthesizer, VoiceError,
    VoicePlatform,
};
use crate::feedback::SpeechFeedback;
use crate::grammar::build_vocabulary_with_extra;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Listening,
    Speaking,
    Stopped,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Listening => write!(f, "listening"),
            SessionState::Speaking => write!(f, "speaking"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Idle,
    Info,
    Listening,
    Speaking,
    Success,
    Error,
}

/// Read-only display surface for the embedding UI. Never used for logic.
#[derive(Debug, Clone)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

/// Shared handle to the current status.
#[derive(Clone)]
pub struct StatusBoard(Arc<Mutex<Status>>);

impl StatusBoard {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Status {
            kind: StatusKind::Idle,
            message: "voice navigation off".to_string(),
        })))
    }

    pub fn get(&self) -> Status {
        self.0.lock().unwrap().clone()
    }

    fn set(&self, kind: StatusKind, message: String) {
        *self.0.lock().unwrap() = Status { kind, message };
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the session loop reacts to. Engines post the transcript,
/// error, and speech variants through [`EventSender`]; the controller
/// posts the user-facing ones.
pub(crate) enum SessionMsg {
    Toggle,
    Stop,
    Teardown,
    InitComplete(u64, Result<InitHandles, VoiceError>),
    FinalTranscript(String),
    PartialTranscript(String),
    RecognitionError(RecognitionErrorKind),
    EngineEnded,
    SpeechStarted,
    SpeechEnded { failed: bool },
}

pub(crate) struct InitHandles {
    track: Box<dyn AudioTrack>,
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
}

/// Posting side of the session loop, handed to engine implementations.
/// Safe to call from any thread; sends never block and are dropped
/// silently once the session is gone.
#[derive(Clone)]
pub struct EventSender {
    tx: flume::Sender<SessionMsg>,
}

impl EventSender {
    pub(crate) fn new(tx: flume::Sender<SessionMsg>) -> Self {
        Self { tx }
    }

    pub fn final_transcript(&self, text: impl Into<String>) {
        let _ = self.tx.send(SessionMsg::FinalTranscript(text.into()));
    }

    pub fn partial_transcript(&self, text: impl Into<String>) {
        let _ = self.tx.send(SessionMsg::PartialTranscript(text.into()));
    }

    pub fn recognition_error(&self, kind: RecognitionErrorKind) {
        let _ = self.tx.send(SessionMsg::RecognitionError(kind));
    }

    pub fn engine_ended(&self) {
        let _ = self.tx.send(SessionMsg::EngineEnded);
    }

    pub fn speech_started(&self) {
        let _ = self.tx.send(SessionMsg::SpeechStarted);
    }

    pub fn speech_ended(&self, failed: bool) {
        let _ = self.tx.send(SessionMsg::SpeechEnded { failed });
    }
}

/// Events published to the embedding UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Dispatch(RecognitionResult),
    Partial(String),
}

struct Session {
    state: SessionState,
    platform: Arc<dyn VoicePlatform>,
    navigator: Box<dyn Navigator>,
    dispatcher: CommandDispatcher,
    orders_len: usize,

    heartbeat: Duration,
    retry_delay: Duration,
    speak_results: bool,
    announce_ready: bool,
    extra_words: Vec<String>,

    tx: flume::Sender<SessionMsg>,
    events: flume::Sender<SessionEvent>,
    status: StatusBoard,

    track: Option<Box<dyn AudioTrack>>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    feedback: Option<SpeechFeedback>,

    heartbeat_at: Option<Instant>,
    restart_at: Option<Instant>,
    retry_count: u32,
    engine_down: bool,
    init_epoch: u64,
}

impl Session {
    fn new(
        platform: Arc<dyn VoicePlatform>,
        navigator: Box<dyn Navigator>,
        orders_len: usize,
        config: &Config,
        tx: flume::Sender<SessionMsg>,
        events: flume::Sender<SessionEvent>,
        status: StatusBoard,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            state: SessionState::Idle,
            platform,
            navigator,
            dispatcher: CommandDispatcher::new()?,
            orders_len,
            heartbeat: Duration::from_secs(config.session.heartbeat_secs),
            retry_delay: Duration::from_millis(config.session.retry_delay_ms),
            speak_results: config.feedback.speak_results,
            announce_ready: config.feedback.announce_ready,
            extra_words: config.grammar.extra_words.clone(),
            tx,
            events,
            status,
            track: None,
            recognizer: None,
            feedback: None,
            heartbeat_at: None,
            restart_at: None,
            retry_count: 0,
            engine_down: false,
            init_epoch: 0,
        })
    }

    fn run(mut self, rx: flume::Receiver<SessionMsg>) {
        loop {
            let msg = match self.next_deadline() {
                Some(deadline) => match rx.recv_deadline(deadline) {
                    Ok(msg) => msg,
                    Err(flume::RecvTimeoutError::Timeout) => {
                        self.on_deadline();
                        continue;
                    }
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };

            let teardown = matches!(msg, SessionMsg::Teardown);
            self.handle(msg);
            if teardown {
                break;
            }
        }
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Toggle => match self.state {
                SessionState::Idle | SessionState::Stopped | SessionState::Error => {
                    self.begin_init()
                }
                SessionState::Initializing | SessionState::Listening | SessionState::Speaking => {
                    self.stop_session()
                }
            },
            SessionMsg::Stop => self.stop_session(),
            SessionMsg::Teardown => self.teardown(),
            SessionMsg::InitComplete(epoch, result) => self.on_init_complete(epoch, result),
            SessionMsg::FinalTranscript(text) => self.on_final(&text),
            SessionMsg::PartialTranscript(text) => self.on_partial(text),
            SessionMsg::RecognitionError(kind) => self.on_recognition_error(kind),
            SessionMsg::EngineEnded => self.on_engine_ended(),
            SessionMsg::SpeechStarted => self.on_speech_started(),
            SessionMsg::SpeechEnded { failed } => self.on_speech_ended(failed),
        }
    }

    // ========================================================================
    // Start / initialization
    // ========================================================================

    fn begin_init(&mut self) {
        self.retry_count = 0;
        self.engine_down = false;
        self.init_epoch += 1;
        self.set_state(SessionState::Initializing);
        self.set_status(StatusKind::Info, "starting voice navigation".to_string());

        let epoch = self.init_epoch;
        let platform = Arc::clone(&self.platform);
        let vocabulary = build_vocabulary_with_extra(&self.extra_words);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let events = EventSender::new(tx.clone());
            let result = open_handles(platform.as_ref(), &vocabulary, events);
            let _ = tx.send(SessionMsg::InitComplete(epoch, result));
        });
    }

    fn on_init_complete(&mut self, epoch: u64, result: Result<InitHandles, VoiceError>) {
        if epoch != self.init_epoch || self.state != SessionState::Initializing {
            // A stop or a newer start won the race; handles acquired by the
            // stale attempt are released here, not adopted.
            if result.is_ok() {
                debug!("releasing handles from a cancelled initialization");
            }
            return;
        }

        let mut handles = match result {
            Ok(handles) => handles,
            Err(e) => return self.fail(e),
        };

        if let Err(e) = handles.recognizer.start() {
            return self.fail(e);
        }

        self.track = Some(handles.track);
        self.recognizer = Some(handles.recognizer);
        self.feedback = Some(SpeechFeedback::new(handles.synthesizer, self.speak_results));
        self.arm_heartbeat();
        self.set_state(SessionState::Listening);
        self.set_status(StatusKind::Listening, "listening".to_string());
        info!(orders = self.orders_len, "voice session listening");

        if self.announce_ready {
            let announcement = format!("Voice navigation ready. {} orders.", self.orders_len);
            if let Some(feedback) = self.feedback.as_mut() {
                feedback.speak(&announcement);
            }
        }
    }

    fn fail(&mut self, error: VoiceError) {
        warn!(%error, "voice session failed");
        self.release_handles();
        self.set_state(SessionState::Error);
        self.set_status(StatusKind::Error, error.to_string());
    }

    // ========================================================================
    // Transcripts
    // ========================================================================

    fn on_final(&mut self, text: &str) {
        if self.state != SessionState::Listening {
            debug!(%text, state = %self.state, "dropping transcript outside listening");
            return;
        }
        self.retry_count = 0;

        let result = self
            .dispatcher
            .process(text, self.navigator.as_mut(), self.orders_len);
        let status_kind = match result.kind {
            ResultKind::Success => StatusKind::Success,
            ResultKind::Error => StatusKind::Error,
            ResultKind::Info => StatusKind::Info,
        };
        self.set_status(status_kind, result.message.clone());
        let _ = self.events.send(SessionEvent::Dispatch(result.clone()));

        // Info results (unmatched utterances) stay silent; success and
        // error messages are worth hearing.
        if result.kind != ResultKind::Info {
            if let Some(feedback) = self.feedback.as_mut() {
                feedback.speak(&result.message);
            }
        }
    }

    fn on_partial(&mut self, text: String) {
        if self.state != SessionState::Listening {
            return;
        }
        self.set_status(StatusKind::Listening, text.clone());
        let _ = self.events.send(SessionEvent::Partial(text));
    }

    // ========================================================================
    // Engine errors and restarts
    // ========================================================================

    fn on_recognition_error(&mut self, kind: RecognitionErrorKind) {
        if !matches!(
            self.state,
            SessionState::Listening | SessionState::Speaking
        ) {
            return;
        }

        if kind.is_fatal() {
            self.release_handles();
            self.set_state(SessionState::Error);
            self.set_status(StatusKind::Error, kind.describe().to_string());
            return;
        }

        debug!(?kind, retries = self.retry_count, "transient engine error");
        self.set_status(StatusKind::Info, kind.describe().to_string());
        self.retry_count += 1;

        if self.state == SessionState::Speaking {
            // Capture is muted anyway; bring the engine back on resume.
            self.engine_down = true;
        } else if self.retry_count <= 1 {
            self.restart_engine("immediate retry");
        } else {
            self.restart_at = Some(Instant::now() + self.retry_delay);
        }
    }

    fn on_engine_ended(&mut self) {
        // A spontaneous end is an internal restart, never a user-visible
        // stop; explicit stops release the handle before this can arrive.
        match self.state {
            SessionState::Listening => self.restart_engine("engine ended"),
            SessionState::Speaking => self.engine_down = true,
            _ => {}
        }
    }

    fn restart_engine(&mut self, reason: &str) {
        if self.state != SessionState::Listening {
            return;
        }
        let result = match self.recognizer.as_mut() {
            Some(recognizer) => {
                debug!(reason, "restarting recognition engine");
                recognizer.stop();
                recognizer.start()
            }
            None => return,
        };
        match result {
            Ok(()) => self.arm_heartbeat(),
            Err(e) => self.fail(e),
        }
    }

    // ========================================================================
    // Speech interlock
    // ========================================================================

    fn on_speech_started(&mut self) {
        if self.state != SessionState::Listening {
            return;
        }
        if let Some(track) = self.track.as_mut() {
            track.set_enabled(false);
        }
        // Pending timers are parked while speaking; the engine is brought
        // back explicitly on resume if anything expired meanwhile.
        if self.restart_at.take().is_some() {
            self.engine_down = true;
        }
        self.heartbeat_at = None;
        self.set_state(SessionState::Speaking);
        self.set_status(StatusKind::Speaking, "speaking".to_string());
    }

    fn on_speech_ended(&mut self, failed: bool) {
        if self.state != SessionState::Speaking {
            return;
        }
        if failed {
            warn!("speech playback ended with an error");
        }
        // The unmute is unconditional: an error path must not leave the
        // microphone dead.
        if let Some(track) = self.track.as_mut() {
            track.set_enabled(true);
        }
        self.set_state(SessionState::Listening);
        self.set_status(StatusKind::Listening, "listening".to_string());
        if self.engine_down {
            self.engine_down = false;
            self.restart_engine("resume after speech");
        } else {
            self.arm_heartbeat();
        }
    }

    // ========================================================================
    // Stop / teardown
    // ========================================================================

    fn stop_session(&mut self) {
        if self.state == SessionState::Stopped {
            debug!("stop on an already stopped session");
            return;
        }
        // Invalidates any in-flight initialization.
        self.init_epoch += 1;
        self.release_handles();
        self.set_state(SessionState::Stopped);
        self.set_status(StatusKind::Idle, "voice navigation off".to_string());
    }

    fn teardown(&mut self) {
        self.init_epoch += 1;
        self.release_handles();
        self.set_state(SessionState::Idle);
        self.set_status(StatusKind::Idle, "voice navigation off".to_string());
    }

    fn release_handles(&mut self) {
        self.heartbeat_at = None;
        self.restart_at = None;
        self.engine_down = false;
        if let Some(feedback) = self.feedback.as_mut() {
            feedback.cancel();
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        if let Some(track) = self.track.as_mut() {
            // Leave the device unmuted on release; no unmatched mute.
            track.set_enabled(true);
        }
        self.feedback = None;
        self.recognizer = None;
        self.track = None;
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn arm_heartbeat(&mut self) {
        self.heartbeat_at = Some(Instant::now() + self.heartbeat);
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.heartbeat_at, self.restart_at) {
            (Some(h), Some(r)) => Some(h.min(r)),
            (a, b) => a.or(b),
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        if self.restart_at.is_some_and(|at| now >= at) {
            self.restart_at = None;
            self.restart_engine("delayed retry");
        }
        if self.heartbeat_at.is_some_and(|at| now >= at) {
            self.restart_engine("heartbeat");
        }
    }

    // ========================================================================
    // State / status plumbing
    // ========================================================================

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "session transition");
            self.state = state;
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }

    fn set_status(&self, kind: StatusKind, message: String) {
        self.status.set(kind, message);
    }
}

fn open_handles(
    platform: &dyn VoicePlatform,
    vocabulary: &[String],
    events: EventSender,
) -> Result<InitHandles, VoiceError> {
    let track = platform.open_microphone()?;
    let recognizer = platform.create_recognizer(vocabulary, events.clone())?;
    let synthesizer = platform.create_synthesizer(events)?;
    Ok(InitHandles {
        track,
        recognizer,
        synthesizer,
    })
}

/// Public handle to a running session loop. One logical session per
/// controller; toggling while a session is live acts as a stop.
pub struct VoiceSessionController {
    tx: flume::Sender<SessionMsg>,
    events: flume::Receiver<SessionEvent>,
    status: StatusBoard,
    worker: Option<thread::JoinHandle<()>>,
}

impl VoiceSessionController {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        navigator: Box<dyn Navigator>,
        orders_len: usize,
        config: &Config,
    ) -> Result<Self, VoiceError> {
        let (tx, rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let status = StatusBoard::new();
        let session = Session::new(
            platform,
            navigator,
            orders_len,
            config,
            tx.clone(),
            event_tx,
            status.clone(),
        )?;
        let worker = thread::spawn(move || session.run(rx));
        Ok(Self {
            tx,
            events: event_rx,
            status,
            worker: Some(worker),
        })
    }

    /// Mic button: starts a session, or stops the live one.
    pub fn toggle(&self) {
        let _ = self.tx.send(SessionMsg::Toggle);
    }

    /// Explicit stop. Safe to call repeatedly.
    pub fn stop(&self) {
        let _ = self.tx.send(SessionMsg::Stop);
    }

    /// Current display status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// UI-facing event stream.
    pub fn events(&self) -> &flume::Receiver<SessionEvent> {
        &self.events
    }

    /// Tear the session down and wait for the loop to exit. Called
    /// automatically on drop.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(SessionMsg::Teardown);
            let _ = worker.join();
        }
    }
}

impl Drop for VoiceSessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct Probes {
        enabled: Arc<AtomicBool>,
        track_released: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        spoken: Arc<Mutex<Vec<String>>>,
        nav_next: Arc<AtomicUsize>,
        nav_prev: Arc<AtomicUsize>,
        nav_selected: Arc<Mutex<Vec<usize>>>,
    }

    struct FakeTrack {
        probes: Probes,
    }

    impl AudioTrack for FakeTrack {
        fn set_enabled(&mut self, enabled: bool) {
            self.probes.enabled.store(enabled, Ordering::SeqCst);
        }
        fn is_enabled(&self) -> bool {
            self.probes.enabled.load(Ordering::SeqCst)
        }
    }

    impl Drop for FakeTrack {
        fn drop(&mut self) {
            self.probes.track_released.store(true, Ordering::SeqCst);
        }
    }

    struct FakeRecognizer {
        probes: Probes,
        fail_start: bool,
    }

    impl SpeechRecognizer for FakeRecognizer {
        fn start(&mut self) -> Result<(), VoiceError> {
            if self.fail_start {
                return Err(VoiceError::EngineStart("model missing".to_string()));
            }
            self.probes.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop(&mut self) {
            self.probes.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeSynth {
        probes: Probes,
        events: EventSender,
    }

    impl SpeechSynthesizer for FakeSynth {
        fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
            self.probes.spoken.lock().unwrap().push(text.to_string());
            self.events.speech_started();
            Ok(())
        }
        fn cancel(&mut self) {}
    }

    struct FakeNav {
        probes: Probes,
    }

    impl Navigator for FakeNav {
        fn next_order(&mut self) {
            self.probes.nav_next.fetch_add(1, Ordering::SeqCst);
        }
        fn prev_order(&mut self) {
            self.probes.nav_prev.fetch_add(1, Ordering::SeqCst);
        }
        fn select_order(&mut self, index: usize) {
            self.probes.nav_selected.lock().unwrap().push(index);
        }
    }

    struct FakePlatform {
        probes: Probes,
        deny_mic: bool,
        fail_start: bool,
        gate: Option<flume::Receiver<()>>,
    }

    impl VoicePlatform for FakePlatform {
        fn open_microphone(&self) -> Result<Box<dyn AudioTrack>, VoiceError> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if self.deny_mic {
                return Err(VoiceError::PermissionDenied);
            }
            self.probes.enabled.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeTrack {
                probes: self.probes.clone(),
            }))
        }

        fn create_recognizer(
            &self,
            _vocabulary: &[String],
            _events: EventSender,
        ) -> Result<Box<dyn SpeechRecognizer>, VoiceError> {
            Ok(Box::new(FakeRecognizer {
                probes: self.probes.clone(),
                fail_start: self.fail_start,
            }))
        }

        fn create_synthesizer(
            &self,
            events: EventSender,
        ) -> Result<Box<dyn SpeechSynthesizer>, VoiceError> {
            Ok(Box::new(FakeSynth {
                probes: self.probes.clone(),
                events,
            }))
        }
    }

    // ------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------

    struct Harness {
        session: Session,
        rx: flume::Receiver<SessionMsg>,
        probes: Probes,
        events: flume::Receiver<SessionEvent>,
    }

    fn harness_with(config: Config, platform: FakePlatform) -> Harness {
        let probes = platform.probes.clone();
        let (tx, rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let session = Session::new(
            Arc::new(platform),
            Box::new(FakeNav {
                probes: probes.clone(),
            }),
            5,
            &config,
            tx,
            event_tx,
            StatusBoard::new(),
        )
        .unwrap();
        Harness {
            session,
            rx,
            probes,
            events: event_rx,
        }
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.feedback.announce_ready = false;
        harness_with(
            config,
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: false,
                gate: None,
            },
        )
    }

    impl Harness {
        /// Drain queued messages (including ones still arriving from the
        /// init worker thread) into the state machine.
        fn pump(&mut self) {
            while let Ok(msg) = self.rx.recv_timeout(Duration::from_millis(500)) {
                self.session.handle(msg);
                if self.rx.is_empty() && self.session.state != SessionState::Initializing {
                    break;
                }
            }
        }

        fn start_listening(&mut self) {
            self.session.handle(SessionMsg::Toggle);
            self.pump();
            assert_eq!(self.session.state, SessionState::Listening);
        }
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn test_start_reaches_listening() {
        let mut h = harness();
        h.start_listening();
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), 1);
        assert!(h.probes.enabled.load(Ordering::SeqCst));
        assert!(h.session.heartbeat_at.is_some());
    }

    #[test]
    fn test_toggle_while_listening_stops() {
        let mut h = harness();
        h.start_listening();
        h.session.handle(SessionMsg::Toggle);
        assert_eq!(h.session.state, SessionState::Stopped);
        assert!(h.session.recognizer.is_none());
        assert!(h.probes.track_released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_idempotent_stop() {
        let mut h = harness();
        h.start_listening();
        h.session.handle(SessionMsg::Stop);
        assert_eq!(h.session.state, SessionState::Stopped);
        h.session.handle(SessionMsg::Stop);
        assert_eq!(h.session.state, SessionState::Stopped);
        assert!(h.session.track.is_none());
        assert!(h.session.heartbeat_at.is_none());
    }

    #[test]
    fn test_dispatch_end_to_end() {
        let mut h = harness();
        h.start_listening();

        h.session
            .handle(SessionMsg::FinalTranscript("next order".to_string()));
        assert_eq!(h.probes.nav_next.load(Ordering::SeqCst), 1);

        h.session
            .handle(SessionMsg::FinalTranscript("previous".to_string()));
        assert_eq!(h.probes.nav_prev.load(Ordering::SeqCst), 1);

        let dispatches: Vec<_> = h
            .events
            .drain()
            .filter_map(|e| match e {
                SessionEvent::Dispatch(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(dispatches.len(), 2);
        assert!(dispatches.iter().all(|r| r.kind == ResultKind::Success));
    }

    #[test]
    fn test_partial_never_dispatches() {
        let mut h = harness();
        h.start_listening();
        h.session
            .handle(SessionMsg::PartialTranscript("next".to_string()));
        assert_eq!(h.probes.nav_next.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.state, SessionState::Listening);
    }

    #[test]
    fn test_mute_interlock() {
        let mut h = harness();
        h.start_listening();

        h.session
            .handle(SessionMsg::FinalTranscript("next order".to_string()));
        // The fake synthesizer posts SpeechStarted on speak.
        h.pump();
        assert_eq!(h.session.state, SessionState::Speaking);
        assert!(!h.probes.enabled.load(Ordering::SeqCst), "track still live");
        assert!(h.session.heartbeat_at.is_none());

        h.session.handle(SessionMsg::SpeechEnded { failed: false });
        assert_eq!(h.session.state, SessionState::Listening);
        assert!(h.probes.enabled.load(Ordering::SeqCst), "track not resumed");
        assert!(h.session.heartbeat_at.is_some());
    }

    #[test]
    fn test_mute_interlock_tts_error_path() {
        let mut h = harness();
        h.start_listening();
        h.session
            .handle(SessionMsg::FinalTranscript("next order".to_string()));
        h.pump();
        assert_eq!(h.session.state, SessionState::Speaking);

        h.session.handle(SessionMsg::SpeechEnded { failed: true });
        assert_eq!(h.session.state, SessionState::Listening);
        assert!(
            h.probes.enabled.load(Ordering::SeqCst),
            "error path left the mic muted"
        );
    }

    #[test]
    fn test_transient_error_restarts() {
        let mut h = harness();
        h.start_listening();
        let starts_before = h.probes.starts.load(Ordering::SeqCst);

        h.session
            .handle(SessionMsg::RecognitionError(RecognitionErrorKind::NoSpeech));
        // First transient failure retries immediately.
        assert_eq!(h.session.state, SessionState::Listening);
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), starts_before + 1);
        assert!(h.session.restart_at.is_none());

        // A repeat schedules a delayed retry instead.
        h.session
            .handle(SessionMsg::RecognitionError(RecognitionErrorKind::Network));
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), starts_before + 1);
        assert!(h.session.restart_at.is_some());
    }

    #[test]
    fn test_delayed_retry_fires() {
        let mut config = Config::default();
        config.feedback.announce_ready = false;
        config.session.retry_delay_ms = 5;
        let mut h = harness_with(
            config,
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: false,
                gate: None,
            },
        );
        h.start_listening();

        h.session
            .handle(SessionMsg::RecognitionError(RecognitionErrorKind::Network));
        h.session
            .handle(SessionMsg::RecognitionError(RecognitionErrorKind::Network));
        assert!(h.session.restart_at.is_some());
        let starts_before = h.probes.starts.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(10));
        h.session.on_deadline();
        assert!(h.session.restart_at.is_none());
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), starts_before + 1);
        assert_eq!(h.session.state, SessionState::Listening);
    }

    #[test]
    fn test_heartbeat_restarts_engine() {
        let mut config = Config::default();
        config.feedback.announce_ready = false;
        config.session.heartbeat_secs = 0;
        let mut h = harness_with(
            config,
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: false,
                gate: None,
            },
        );
        h.start_listening();
        let starts_before = h.probes.starts.load(Ordering::SeqCst);
        let stops_before = h.probes.stops.load(Ordering::SeqCst);

        h.session.on_deadline();
        assert_eq!(h.probes.stops.load(Ordering::SeqCst), stops_before + 1);
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), starts_before + 1);
        assert_eq!(h.session.state, SessionState::Listening);
        assert!(h.session.heartbeat_at.is_some());
    }

    #[test]
    fn test_engine_ended_is_internal_restart() {
        let mut h = harness();
        h.start_listening();
        let starts_before = h.probes.starts.load(Ordering::SeqCst);

        h.session.handle(SessionMsg::EngineEnded);
        assert_eq!(h.session.state, SessionState::Listening);
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), starts_before + 1);
    }

    #[test]
    fn test_permission_denied_is_fatal() {
        let mut h = harness_with(
            Config::default(),
            FakePlatform {
                probes: Probes::default(),
                deny_mic: true,
                fail_start: false,
                gate: None,
            },
        );
        h.session.handle(SessionMsg::Toggle);
        h.pump();
        assert_eq!(h.session.state, SessionState::Error);
        let status = h.session.status.get();
        assert_eq!(status.kind, StatusKind::Error);
    }

    #[test]
    fn test_runtime_permission_error_is_fatal() {
        let mut h = harness();
        h.start_listening();
        h.session.handle(SessionMsg::RecognitionError(
            RecognitionErrorKind::PermissionDenied,
        ));
        assert_eq!(h.session.state, SessionState::Error);
        assert!(h.session.recognizer.is_none());
        assert!(h.probes.track_released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_engine_start_failure_is_error() {
        let mut h = harness_with(
            Config::default(),
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: true,
                gate: None,
            },
        );
        h.session.handle(SessionMsg::Toggle);
        h.pump();
        assert_eq!(h.session.state, SessionState::Error);
        assert!(h.probes.track_released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_during_init_releases_late_handles() {
        let (gate_tx, gate_rx) = flume::bounded(1);
        let mut h = harness_with(
            Config::default(),
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: false,
                gate: Some(gate_rx),
            },
        );

        h.session.handle(SessionMsg::Toggle);
        assert_eq!(h.session.state, SessionState::Initializing);

        // User stops before initialization completes.
        h.session.handle(SessionMsg::Stop);
        assert_eq!(h.session.state, SessionState::Stopped);

        // Let the init worker finish; its handles must be dropped, not
        // adopted.
        gate_tx.send(()).unwrap();
        while let Ok(msg) = h.rx.recv_timeout(Duration::from_millis(500)) {
            h.session.handle(msg);
            if h.probes.track_released.load(Ordering::SeqCst) {
                break;
            }
        }
        assert_eq!(h.session.state, SessionState::Stopped);
        assert!(h.probes.track_released.load(Ordering::SeqCst));
        assert_eq!(h.probes.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_announce_ready_speaks() {
        let mut config = Config::default();
        config.feedback.announce_ready = true;
        let mut h = harness_with(
            config,
            FakePlatform {
                probes: Probes::default(),
                deny_mic: false,
                fail_start: false,
                gate: None,
            },
        );
        h.session.handle(SessionMsg::Toggle);
        h.pump();
        let spoken = h.probes.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("5 orders"));
    }

    #[test]
    fn test_teardown_forces_idle() {
        let mut h = harness();
        h.start_listening();
        h.session.handle(SessionMsg::Teardown);
        assert_eq!(h.session.state, SessionState::Idle);
        assert!(h.session.track.is_none());
        assert!(h.probes.track_released.load(Ordering::SeqCst));
    }
}
