use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub grammar: GrammarConfig,
}

// ============================================================================
// Session Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval between forced engine restarts while listening. Keeps the
    /// underlying platform recognizer from silently timing out on long
    /// idle stretches.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Delay before retrying after a repeated transient engine error.
    /// The first retry after an error is immediate.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    2000
}

// ============================================================================
// Feedback Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    /// Speak dispatch results back to the user.
    #[serde(default = "default_speak_results")]
    pub speak_results: bool,

    /// Announce "voice navigation ready" when a session reaches listening.
    #[serde(default = "default_announce_ready")]
    pub announce_ready: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            speak_results: default_speak_results(),
            announce_ready: default_announce_ready(),
        }
    }
}

fn default_speak_results() -> bool {
    true
}

fn default_announce_ready() -> bool {
    true
}

// ============================================================================
// Grammar Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GrammarConfig {
    /// Additional words merged into the recognizer vocabulary.
    #[serde(default)]
    pub extra_words: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            fs::read_to_string(path)
                .ok()
                .and_then(|s| toml::from_str(&s).ok())
                .unwrap_or_default()
        } else {
            Config::default()
        }
    }
}
