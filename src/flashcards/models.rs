//! Data models for the flashcard system

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle bucket of a card, derived from how often it has been reviewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// Never reviewed
    Learning,
    /// Reviewed at least once, not yet mastered
    Reviewing,
    /// Reviewed five or more times
    Mastered,
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::Learning
    }
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Reviewing => "reviewing",
            Self::Mastered => "mastered",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown card status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CardStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(Self::Learning),
            "reviewing" => Ok(Self::Reviewing),
            "mastered" => Ok(Self::Mastered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Rating must be between 1 and 5, got {0}")]
pub struct InvalidRating(pub i64);

/// Self-assessed recall quality
/// 1 = forgot
/// 2 = recalled with great effort
/// 3 = recalled with some effort
/// 4 = recalled with hesitation
/// 5 = perfect recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, InvalidRating> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidRating(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every valid rating, lowest first
    pub fn all() -> impl Iterator<Item = Rating> {
        (Self::MIN..=Self::MAX).map(Rating)
    }
}

impl TryFrom<i64> for Rating {
    type Error = InvalidRating;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vocabulary card with its scheduling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub word: String,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Number of committed reviews
    #[serde(default)]
    pub review_count: u32,
    /// When the card is next due
    pub next_review: DateTime<Utc>,
    #[serde(default)]
    pub status: CardStatus,
    /// Bumped by every committed review; guards concurrent review commits
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// A fresh card: learning, never reviewed, due immediately
    pub fn new(owner_id: Uuid, content: NewCard, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            word: content.word,
            definition: content.definition,
            example: content.example,
            notes: content.notes,
            review_count: 0,
            next_review: now,
            status: CardStatus::Learning,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the card is due at the given instant
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    pub fn schedule(&self) -> ScheduleUpdate {
        ScheduleUpdate {
            review_count: self.review_count,
            next_review: self.next_review,
            status: self.status,
        }
    }

    pub(crate) fn apply_schedule(&mut self, schedule: &ScheduleUpdate) {
        self.review_count = schedule.review_count;
        self.next_review = schedule.next_review;
        self.status = schedule.status;
        self.version += 1;
    }
}

/// Content of a card to be created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial edit of a card's content. Scheduling fields are not editable.
///
/// `example` and `notes` distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub example: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl CardUpdate {
    pub fn is_empty(&self) -> bool {
        self.word.is_none()
            && self.definition.is_none()
            && self.example.is_none()
            && self.notes.is_none()
    }

    /// Apply the edited fields to a card
    pub fn apply_to(&self, card: &mut Card, now: DateTime<Utc>) {
        if let Some(word) = &self.word {
            card.word = word.clone();
        }
        if let Some(definition) = &self.definition {
            card.definition = definition.clone();
        }
        if let Some(example) = &self.example {
            card.example = example.clone();
        }
        if let Some(notes) = &self.notes {
            card.notes = notes.clone();
        }
        card.updated_at = now;
    }
}

/// The scheduling fields a review commits as one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleUpdate {
    pub review_count: u32,
    pub next_review: DateTime<Utc>,
    pub status: CardStatus,
}

/// A record of a single review attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub card_id: Uuid,
    pub rating: Rating,
    /// When the review occurred
    pub review_date: DateTime<Utc>,
    /// Whole hours until the next review (floor of the scheduled interval)
    pub next_interval: i64,
}

impl Review {
    pub fn new(card_id: Uuid, rating: Rating, review_date: DateTime<Utc>, next_interval: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            rating,
            review_date,
            next_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReviewCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingCount {
    pub rating: u8,
    pub count: usize,
}

/// Cards in each status that existed by the end of `date`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTrendPoint {
    pub date: NaiveDate,
    pub learning: usize,
    pub reviewing: usize,
    pub mastered: usize,
}

/// Study statistics for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_cards: usize,
    pub learning_cards: usize,
    pub reviewing_cards: usize,
    pub mastered_cards: usize,
    pub due_cards: usize,
    /// Reviews per day, oldest day first
    pub daily_reviews: Vec<DailyReviewCount>,
    /// Reviews per rating, 1 through 5
    pub review_ratings: Vec<RatingCount>,
    /// Status counts per day, oldest day first
    pub card_status_trend: Vec<StatusTrendPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert_eq!(Rating::all().count(), 5);
    }

    #[test]
    fn test_rating_rejected_when_deserializing() {
        let err = serde_json::from_str::<Rating>("7");
        assert!(err.is_err());

        let rating: Rating = serde_json::from_str("4").unwrap();
        assert_eq!(rating.value(), 4);
    }

    #[test]
    fn test_new_card_is_learning_and_due() {
        let now = Utc::now();
        let card = Card::new(
            Uuid::new_v4(),
            NewCard {
                word: "ephemeral".to_string(),
                definition: "lasting a very short time".to_string(),
                ..Default::default()
            },
            now,
        );

        assert_eq!(card.review_count, 0);
        assert_eq!(card.status, CardStatus::Learning);
        assert!(card.is_due_at(now));
        assert_eq!(card.version, 0);
    }

    #[test]
    fn test_card_update_distinguishes_clear_from_absent() {
        let update: CardUpdate = serde_json::from_str(r#"{"example": null}"#).unwrap();
        assert_eq!(update.example, Some(None));
        assert_eq!(update.notes, None);
        assert!(!update.is_empty());

        let empty: CardUpdate = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_card_update_leaves_schedule_alone() {
        let now = Utc::now();
        let mut card = Card::new(Uuid::new_v4(), NewCard::default(), now);
        card.review_count = 3;
        card.status = CardStatus::Reviewing;

        let update = CardUpdate {
            word: Some("laconic".to_string()),
            notes: Some(Some("from Laconia".to_string())),
            ..Default::default()
        };
        update.apply_to(&mut card, now);

        assert_eq!(card.word, "laconic");
        assert_eq!(card.notes.as_deref(), Some("from Laconia"));
        assert_eq!(card.review_count, 3);
        assert_eq!(card.status, CardStatus::Reviewing);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [CardStatus::Learning, CardStatus::Reviewing, CardStatus::Mastered] {
            assert_eq!(status.as_str().parse::<CardStatus>().unwrap(), status);
        }
        assert!("relearning".parse::<CardStatus>().is_err());
    }
}
