//! Lexicard: a spaced-repetition vocabulary service.
//!
//! The scheduling core lives in [`flashcards`]; [`server`] exposes it over
//! HTTP and the `lexicard-cli` binary drives it from a terminal.

pub mod config;
pub mod error;
pub mod flashcards;
pub mod notifications;
pub mod server;
pub mod storage;
