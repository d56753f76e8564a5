//! In-memory store

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::{CardStore, Result, SettingsStore, StoreError};
use crate::flashcards::models::{Card, CardUpdate, Review, ScheduleUpdate};
use crate::notifications::models::NotificationSettings;

#[derive(Default)]
struct Tables {
    cards: HashMap<Uuid, Card>,
    /// Review history per card, in commit order
    reviews: HashMap<Uuid, Vec<Review>>,
    settings: HashMap<Uuid, NotificationSettings>,
}

/// Store backed by maps behind a single lock.
/// Every write holds the write lock for its whole read-check-write sequence.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn insert_card(&self, card: &Card) -> Result<()> {
        let mut tables = self.write()?;
        tables.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Card>> {
        let tables = self.read()?;
        Ok(tables.cards.get(&card_id).cloned())
    }

    async fn list_cards_by_owner(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        let tables = self.read()?;
        let mut cards: Vec<Card> = tables
            .cards
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cards)
    }

    async fn update_card_content(
        &self,
        card_id: Uuid,
        update: &CardUpdate,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let mut tables = self.write()?;
        let card = tables
            .cards
            .get_mut(&card_id)
            .ok_or(StoreError::CardNotFound(card_id))?;
        update.apply_to(card, now);
        Ok(card.clone())
    }

    async fn delete_card(&self, card_id: Uuid) -> Result<()> {
        let mut tables = self.write()?;
        tables
            .cards
            .remove(&card_id)
            .ok_or(StoreError::CardNotFound(card_id))?;
        tables.reviews.remove(&card_id);
        Ok(())
    }

    async fn commit_review(
        &self,
        card_id: Uuid,
        expected_version: u64,
        schedule: &ScheduleUpdate,
        review: &Review,
        deadline: Instant,
    ) -> Result<Card> {
        let mut tables = self.write()?;
        if Instant::now() >= deadline {
            return Err(StoreError::Unavailable("commit_review deadline passed".to_string()));
        }
        let card = tables
            .cards
            .get_mut(&card_id)
            .ok_or(StoreError::CardNotFound(card_id))?;
        if card.version != expected_version {
            return Err(StoreError::Conflict(card_id));
        }

        card.apply_schedule(schedule);
        let committed = card.clone();
        tables.reviews.entry(card_id).or_default().push(review.clone());
        Ok(committed)
    }

    async fn list_reviews_for_card(&self, card_id: Uuid) -> Result<Vec<Review>> {
        let tables = self.read()?;
        Ok(tables.reviews.get(&card_id).cloned().unwrap_or_default())
    }

    async fn list_reviews_by_owner(&self, owner_id: Uuid) -> Result<Vec<Review>> {
        let tables = self.read()?;
        let mut reviews: Vec<Review> = tables
            .cards
            .values()
            .filter(|c| c.owner_id == owner_id)
            .filter_map(|c| tables.reviews.get(&c.id))
            .flatten()
            .cloned()
            .collect();
        reviews.sort_by(|a, b| a.review_date.cmp(&b.review_date));
        Ok(reviews)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>> {
        let tables = self.read()?;
        Ok(tables.settings.get(&user_id).cloned())
    }

    async fn put_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let mut tables = self.write()?;
        tables.settings.insert(settings.user_id, settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::models::{CardStatus, NewCard, Rating};

    fn card_for(owner_id: Uuid, word: &str) -> Card {
        Card::new(
            owner_id,
            NewCard {
                word: word.to_string(),
                definition: format!("definition of {}", word),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + std::time::Duration::from_secs(5)
    }

    fn schedule_after_one_review(card: &Card) -> ScheduleUpdate {
        ScheduleUpdate {
            review_count: card.review_count + 1,
            next_review: card.next_review + chrono::Duration::hours(1),
            status: CardStatus::Reviewing,
        }
    }

    #[tokio::test]
    async fn test_commit_review_bumps_version_and_appends_history() {
        let store = MemoryStore::new();
        let card = card_for(Uuid::new_v4(), "sonder");
        store.insert_card(&card).await.unwrap();

        let review = Review::new(card.id, Rating::new(4).unwrap(), Utc::now(), 1);
        let committed = store
            .commit_review(card.id, 0, &schedule_after_one_review(&card), &review, far_deadline())
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(committed.review_count, 1);
        assert_eq!(store.list_reviews_for_card(card.id).await.unwrap(), vec![review]);
    }

    #[tokio::test]
    async fn test_commit_after_deadline_writes_nothing() {
        let store = MemoryStore::new();
        let card = card_for(Uuid::new_v4(), "sillage");
        store.insert_card(&card).await.unwrap();

        let review = Review::new(card.id, Rating::new(4).unwrap(), Utc::now(), 1);
        let err = store
            .commit_review(card.id, 0, &schedule_after_one_review(&card), &review, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let stored = store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!((stored.review_count, stored.version), (0, 0));
        assert!(store.list_reviews_for_card(card.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_without_writing() {
        let store = MemoryStore::new();
        let card = card_for(Uuid::new_v4(), "petrichor");
        store.insert_card(&card).await.unwrap();

        let first = Review::new(card.id, Rating::new(3).unwrap(), Utc::now(), 1);
        store
            .commit_review(card.id, 0, &schedule_after_one_review(&card), &first, far_deadline())
            .await
            .unwrap();

        let stale = Review::new(card.id, Rating::new(5).unwrap(), Utc::now(), 1);
        let err = store
            .commit_review(card.id, 0, &schedule_after_one_review(&card), &stale, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == card.id));

        let stored = store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.review_count, 1);
        assert_eq!(store.list_reviews_for_card(card.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reviews_scoped_to_owner() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let alice_card = card_for(alice, "apricity");
        let bob_card = card_for(bob, "hiraeth");
        store.insert_card(&alice_card).await.unwrap();
        store.insert_card(&bob_card).await.unwrap();

        let review = Review::new(bob_card.id, Rating::new(2).unwrap(), Utc::now(), 1);
        store
            .commit_review(bob_card.id, 0, &schedule_after_one_review(&bob_card), &review, far_deadline())
            .await
            .unwrap();

        assert!(store.list_reviews_by_owner(alice).await.unwrap().is_empty());
        assert_eq!(store.list_reviews_by_owner(bob).await.unwrap().len(), 1);
        assert_eq!(store.list_cards_by_owner(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_card_drops_history() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let card = card_for(owner, "vellichor");
        store.insert_card(&card).await.unwrap();
        let review = Review::new(card.id, Rating::new(3).unwrap(), Utc::now(), 1);
        store
            .commit_review(card.id, 0, &schedule_after_one_review(&card), &review, far_deadline())
            .await
            .unwrap();

        store.delete_card(card.id).await.unwrap();

        assert!(store.get_card(card.id).await.unwrap().is_none());
        assert!(store.list_reviews_by_owner(owner).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_card(card.id).await,
            Err(StoreError::CardNotFound(_))
        ));
    }
}
