//! Voice-driven navigation engine for an order-browsing tool.
//!
//! A continuously-listening speech pipeline that turns spoken utterances
//! into navigation intents (next, previous, first, last, open order N)
//! while speaking confirmations back without the playback being captured
//! as a new command. The concrete recognizer and synthesizer live behind
//! the capability traits in [`engine`]; everything else is in-process.

pub mod command;
pub mod config;
pub mod console;
pub mod engine;
pub mod feedback;
pub mod grammar;
pub mod lexicon;
pub mod numbers;
pub mod session;
