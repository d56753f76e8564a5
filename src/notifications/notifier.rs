//! Notification dispatch seam
//!
//! Delivery (email, push) lives outside this crate. Whatever needs to send a
//! notification is handed a `Notifier` when it is constructed.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// A card was added to the user's collection
    #[serde(rename_all = "camelCase")]
    NewCard { card_id: Uuid, word: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: Uuid, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::NewCard { card_id, word } => {
                log::info!("Notify {}: new card '{}' ({})", user_id, word, card_id);
            }
        }
        Ok(())
    }
}
