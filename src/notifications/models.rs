//! Notification settings models

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kinds of notification a user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTypes {
    #[serde(default = "enabled")]
    pub new_cards: bool,
    #[serde(default = "enabled")]
    pub study_reminders: bool,
    #[serde(default = "enabled")]
    pub achievement_unlocked: bool,
    #[serde(default)]
    pub system_updates: bool,
}

fn enabled() -> bool {
    true
}

impl Default for NotificationTypes {
    fn default() -> Self {
        Self {
            new_cards: true,
            study_reminders: true,
            achievement_unlocked: true,
            system_updates: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewCards,
    StudyReminders,
    AchievementUnlocked,
    SystemUpdates,
}

/// Per-user notification preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub user_id: Uuid,
    #[serde(default = "enabled")]
    pub email_notifications: bool,
    #[serde(default = "enabled")]
    pub push_notifications: bool,
    #[serde(default)]
    pub notification_types: NotificationTypes,
    /// Local time of day for the daily study reminder
    #[serde(default = "default_reminder_time")]
    pub study_reminder_time: NaiveTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_reminder_time() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl NotificationSettings {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            email_notifications: true,
            push_notifications: true,
            notification_types: NotificationTypes::default(),
            study_reminder_time: default_reminder_time(),
            updated_at: None,
        }
    }

    /// Whether a notification of this kind may be sent on any channel
    pub fn allows(&self, kind: NotificationKind) -> bool {
        if !self.email_notifications && !self.push_notifications {
            return false;
        }
        let types = &self.notification_types;
        match kind {
            NotificationKind::NewCards => types.new_cards,
            NotificationKind::StudyReminders => types.study_reminders,
            NotificationKind::AchievementUnlocked => types.achievement_unlocked,
            NotificationKind::SystemUpdates => types.system_updates,
        }
    }
}

/// Partial update of notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettingsUpdate {
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub notification_types: Option<NotificationTypes>,
    pub study_reminder_time: Option<NaiveTime>,
}

impl NotificationSettingsUpdate {
    pub fn apply_to(&self, settings: &mut NotificationSettings, now: DateTime<Utc>) {
        if let Some(email) = self.email_notifications {
            settings.email_notifications = email;
        }
        if let Some(push) = self.push_notifications {
            settings.push_notifications = push;
        }
        if let Some(types) = self.notification_types {
            settings.notification_types = types;
        }
        if let Some(time) = self.study_reminder_time {
            settings.study_reminder_time = time;
        }
        settings.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = NotificationSettings::defaults_for(Uuid::new_v4());
        assert!(settings.allows(NotificationKind::NewCards));
        assert!(!settings.allows(NotificationKind::SystemUpdates));
        assert_eq!(settings.study_reminder_time, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    }

    #[test]
    fn test_all_channels_off_blocks_everything() {
        let mut settings = NotificationSettings::defaults_for(Uuid::new_v4());
        settings.email_notifications = false;
        settings.push_notifications = false;
        assert!(!settings.allows(NotificationKind::NewCards));
        assert!(!settings.allows(NotificationKind::StudyReminders));
    }

    #[test]
    fn test_partial_update() {
        let mut settings = NotificationSettings::defaults_for(Uuid::new_v4());
        let update: NotificationSettingsUpdate =
            serde_json::from_str(r#"{"pushNotifications": false, "studyReminderTime": "07:30:00"}"#)
                .unwrap();
        update.apply_to(&mut settings, Utc::now());

        assert!(settings.email_notifications);
        assert!(!settings.push_notifications);
        assert_eq!(settings.study_reminder_time, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert!(settings.updated_at.is_some());
    }
}
