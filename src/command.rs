//! Command dispatch - maps final transcripts to navigation intents.
//!
//! Intents are checked in table order and the first full pattern match
//! wins. Order encodes priority: "first" and "last" sit ahead of the
//! generic open-N catch-all so that "open first" resolves to the first
//! order instead of a failed number parse.

use regex::Regex;
use thiserror::Error;

use crate::numbers::parse_spoken_number;

/// Navigation callbacks owned by the embedding UI. Indexes handed to
/// `select_order` are zero-based and validated by the dispatcher first.
pub trait Navigator: Send {
    fn next_order(&mut self);
    fn prev_order(&mut self);
    fn select_order(&mut self, index: usize);
}

/// Dispatch-level failures. These never propagate past the dispatcher;
/// they are folded into a [`RecognitionResult`] with `kind == Error`.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("there are no orders to show")]
    NoOrders,

    #[error("could not make out an order number in \"{phrase}\"")]
    NumberUnclear { phrase: String },

    #[error("order {requested} is out of range, orders go from 1 to {max}")]
    OutOfRange { requested: u32, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Success,
    Error,
    Info,
}

/// Outcome of one processed transcript. Produced exactly once per final
/// transcript and never retried.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub success: bool,
    pub kind: ResultKind,
    pub message: String,
}

impl RecognitionResult {
    fn success(message: String) -> Self {
        Self {
            success: true,
            kind: ResultKind::Success,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            kind: ResultKind::Error,
            message,
        }
    }

    fn info(message: String) -> Self {
        Self {
            success: false,
            kind: ResultKind::Info,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum IntentAction {
    First,
    Last,
    Next,
    Previous,
    Open,
}

/// One intent: an id for logs, its surface patterns, and the bound action.
pub struct CommandIntent {
    id: &'static str,
    patterns: Vec<Regex>,
    action: IntentAction,
}

impl CommandIntent {
    fn new(
        id: &'static str,
        patterns: &[&str],
        action: IntentAction,
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id,
            patterns,
            action,
        })
    }
}

/// Checks transcripts against the intent table. Holds no mutable state;
/// dispatch is a pure function of the transcript, the table, and the
/// navigation context passed in.
pub struct CommandDispatcher {
    intents: Vec<CommandIntent>,
}

impl CommandDispatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            intents: default_intents()?,
        })
    }

    /// Process one final transcript. The first intent with a matching
    /// pattern runs; remaining intents are not evaluated. An unmatched
    /// transcript is an `Info` result, not an error.
    pub fn process(
        &self,
        transcript: &str,
        navigator: &mut dyn Navigator,
        orders_len: usize,
    ) -> RecognitionResult {
        let text = normalize(transcript);
        if text.is_empty() {
            return RecognitionResult::info("nothing to process".to_string());
        }

        for intent in &self.intents {
            for pattern in &intent.patterns {
                if let Some(captures) = pattern.captures(&text) {
                    tracing::debug!(intent = intent.id, %text, "matched");
                    let remainder = captures.get(1).map(|m| m.as_str());
                    return match run_action(intent.action, remainder, navigator, orders_len) {
                        Ok(message) => RecognitionResult::success(message),
                        Err(e) => RecognitionResult::error(e.to_string()),
                    };
                }
            }
        }

        RecognitionResult::info(format!(
            "didn't catch a command in \"{}\"",
            transcript.trim()
        ))
    }
}

fn run_action(
    action: IntentAction,
    remainder: Option<&str>,
    navigator: &mut dyn Navigator,
    orders_len: usize,
) -> Result<String, NavigationError> {
    match action {
        IntentAction::First => {
            if orders_len == 0 {
                return Err(NavigationError::NoOrders);
            }
            navigator.select_order(0);
            Ok("Opening the first order.".to_string())
        }
        IntentAction::Last => {
            if orders_len == 0 {
                return Err(NavigationError::NoOrders);
            }
            navigator.select_order(orders_len - 1);
            Ok("Opening the last order.".to_string())
        }
        IntentAction::Next => {
            navigator.next_order();
            Ok("Moving to the next order.".to_string())
        }
        IntentAction::Previous => {
            navigator.prev_order();
            Ok("Going back one order.".to_string())
        }
        IntentAction::Open => {
            let phrase = remainder.unwrap_or_default().trim();
            let number =
                parse_spoken_number(phrase).ok_or_else(|| NavigationError::NumberUnclear {
                    phrase: phrase.to_string(),
                })?;
            if number == 0 || number as usize > orders_len {
                return Err(NavigationError::OutOfRange {
                    requested: number,
                    max: orders_len,
                });
            }
            navigator.select_order(number as usize - 1);
            Ok(format!("Opening order {}.", number))
        }
    }
}

/// Lowercase, strip everything but letters, digits and spaces, collapse
/// whitespace. Recognizer output is already plain but typed transcripts
/// in the simulated session carry punctuation.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn default_intents() -> Result<Vec<CommandIntent>, regex::Error> {
    Ok(vec![
        CommandIntent::new(
            "first",
            &[
                r"^(?:(?:go to|goto|open|select|show)\s+)?(?:the\s+)?first(?:\s+(?:order|page|item|one))?$",
            ],
            IntentAction::First,
        )?,
        CommandIntent::new(
            "last",
            &[
                r"^(?:(?:go to|goto|open|select|show)\s+)?(?:the\s+)?last(?:\s+(?:order|page|item|one))?$",
            ],
            IntentAction::Last,
        )?,
        CommandIntent::new(
            "next",
            &[
                r"^(?:(?:go|move)\s+)?(?:to\s+)?(?:the\s+)?next(?:\s+(?:order|page|item|one))?$",
                r"^(?:go\s+)?forward$",
            ],
            IntentAction::Next,
        )?,
        CommandIntent::new(
            "previous",
            &[
                r"^(?:(?:go|move)\s+)?(?:to\s+)?(?:the\s+)?(?:previous|prev)(?:\s+(?:order|page|item|one))?$",
                r"^(?:go\s+)?(?:back|backward|backwards)$",
            ],
            IntentAction::Previous,
        )?,
        CommandIntent::new(
            "open",
            &[
                r"^(?:go to|goto|open|select|show)\s+(?:(?:order|item|page)\s+)?(.+)$",
                r"^(?:order|item|page)\s+(.+)$",
            ],
            IntentAction::Open,
        )?,
    ])
}
