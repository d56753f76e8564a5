//! Notification preferences and the dispatch seam

pub mod models;
pub mod notifier;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{bounded, SettingsStore};

pub use models::{NotificationKind, NotificationSettings, NotificationSettingsUpdate, NotificationTypes};
pub use notifier::{LogNotifier, Notification, Notifier, NotifyError};

/// Reads and edits per-user notification settings
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn SettingsStore>,
    timeout: Duration,
}

impl NotificationService {
    pub fn new(store: Arc<dyn SettingsStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Stored settings, or the defaults when the user never saved any
    pub async fn get_settings(&self, user_id: Uuid) -> Result<NotificationSettings> {
        let stored = bounded(self.timeout, "get_settings", self.store.get_settings(user_id)).await?;
        Ok(stored.unwrap_or_else(|| NotificationSettings::defaults_for(user_id)))
    }

    pub async fn update_settings(
        &self,
        user_id: Uuid,
        update: NotificationSettingsUpdate,
    ) -> Result<NotificationSettings> {
        let mut settings = self.get_settings(user_id).await?;
        update.apply_to(&mut settings, Utc::now());
        bounded(self.timeout, "put_settings", self.store.put_settings(&settings)).await?;
        log::debug!("Updated notification settings for {}", user_id);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn service() -> NotificationService {
        NotificationService::new(Arc::new(MemoryStore::new()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_stored() {
        let user = Uuid::new_v4();
        let settings = service().get_settings(user).await.unwrap();
        assert_eq!(settings, NotificationSettings::defaults_for(user));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let service = service();
        let user = Uuid::new_v4();

        let update = NotificationSettingsUpdate {
            email_notifications: Some(false),
            notification_types: Some(NotificationTypes {
                new_cards: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        service.update_settings(user, update).await.unwrap();

        let settings = service.get_settings(user).await.unwrap();
        assert!(!settings.email_notifications);
        assert!(settings.push_notifications);
        assert!(!settings.allows(NotificationKind::NewCards));
        assert!(settings.allows(NotificationKind::StudyReminders));
    }
}
