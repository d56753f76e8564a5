//! Error taxonomy shared by the card, statistics and notification services

use thiserror::Error;
use uuid::Uuid;

use crate::flashcards::models::InvalidRating;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The record does not exist or is not visible to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// The card exists but belongs to another user
    #[error("Card {0} belongs to another user")]
    Forbidden(Uuid),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A concurrent review committed first; the caller may retry
    #[error("Card {0} was modified concurrently")]
    Conflict(Uuid),

    /// The store failed or timed out; the caller may retry with backoff
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CardNotFound(id) => Self::NotFound(format!("Card {}", id)),
            StoreError::Conflict(id) => Self::Conflict(id),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<InvalidRating> for ServiceError {
    fn from(err: InvalidRating) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
