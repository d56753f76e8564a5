//! Vocabulary flashcards and spaced repetition
//!
//! This module provides:
//! - Card and review models
//! - The forgetting-curve interval model and status classifier
//! - The review transaction (card lifecycle)
//! - Card CRUD scoped to the owning user
//! - Study statistics

pub mod algorithm;
pub mod lifecycle;
pub mod models;
pub mod service;
pub mod stats;

pub use lifecycle::{apply_review, ReviewOutcome};
pub use models::*;
pub use service::CardService;
pub use stats::StatisticsService;
