//! Persistence for cards, reviews and notification settings
//!
//! Two backends implement the store traits:
//! - `MemoryStore`: lock-guarded maps, for tests and throwaway runs
//! - `SqliteStore`: a single SQLite database file

mod memory;
mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::ServiceError;
use crate::flashcards::models::{Card, CardUpdate, Review, ScheduleUpdate};
use crate::notifications::models::NotificationSettings;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Card not found: {0}")]
    CardNotFound(Uuid),

    #[error("Card {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Cards keyed by id and indexed by owner; reviews keyed by id and indexed
/// by card and review date.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn insert_card(&self, card: &Card) -> Result<()>;

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Card>>;

    /// All cards of an owner, oldest first
    async fn list_cards_by_owner(&self, owner_id: Uuid) -> Result<Vec<Card>>;

    /// Apply a content edit and return the edited card
    async fn update_card_content(
        &self,
        card_id: Uuid,
        update: &CardUpdate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Card>;

    /// Delete a card together with its review history
    async fn delete_card(&self, card_id: Uuid) -> Result<()>;

    /// Atomically write the card's scheduling fields and append the review,
    /// provided the stored version still equals `expected_version`.
    /// Fails with `Conflict` otherwise, leaving both card and history untouched.
    ///
    /// If the write cannot start before `deadline` the call fails with
    /// `Unavailable` and nothing is written. A write that has started is
    /// always reported with its real outcome, however late.
    async fn commit_review(
        &self,
        card_id: Uuid,
        expected_version: u64,
        schedule: &ScheduleUpdate,
        review: &Review,
        deadline: Instant,
    ) -> Result<Card>;

    /// Review history of a card, oldest first
    async fn list_reviews_for_card(&self, card_id: Uuid) -> Result<Vec<Review>>;

    /// Every review of every card the owner holds, oldest first
    async fn list_reviews_by_owner(&self, owner_id: Uuid) -> Result<Vec<Review>>;
}

/// Per-user notification settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>>;

    async fn put_settings(&self, settings: &NotificationSettings) -> Result<()>;
}

/// The stores a running service works against
#[derive(Clone)]
pub struct Stores {
    pub cards: Arc<dyn CardStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            cards: store.clone(),
            settings: store,
        }
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            cards: store.clone(),
            settings: store,
        }
    }

    /// Open the backend named in the configuration
    pub fn open(config: &StorageConfig) -> std::result::Result<Self, crate::config::ConfigError> {
        match config.backend {
            StorageBackend::Memory => {
                log::info!("Using in-memory store");
                Ok(Self::in_memory())
            }
            StorageBackend::Sqlite => {
                let path = config.database_path()?;
                log::info!("Opening SQLite store at {}", path.display());
                let store = SqliteStore::open(path)?;
                Ok(Self::sqlite(store))
            }
        }
    }
}

/// Run a store call under a time limit, surfacing expiry as `Unavailable`.
///
/// Expiry abandons the future, so only calls that are safe to abandon go
/// through here. Review commits take a deadline instead.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> crate::error::Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => {
            log::warn!("Store call {} timed out after {}ms", operation, limit.as_millis());
            Err(ServiceError::Unavailable(format!(
                "{} timed out after {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out_as_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(())
        };

        let err = bounded(Duration::from_millis(10), "slow_call", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bounded_passes_through_store_errors() {
        let id = Uuid::new_v4();
        let err = bounded(Duration::from_secs(1), "commit_review", async {
            Err::<(), _>(StoreError::Conflict(id))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(got) if got == id));
    }
}
