//! Card operations scoped to the requesting user

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::lifecycle::{apply_review, ReviewOutcome};
use super::models::{Card, CardUpdate, NewCard, Rating, Review};
use crate::error::{Result, ServiceError};
use crate::storage::{bounded, CardStore};

/// Largest page `list_cards` returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Card CRUD plus the review transaction.
///
/// Every store call is bounded by `timeout`; expiry surfaces as
/// `ServiceError::Unavailable`. A review commit that reports `Unavailable`
/// has written nothing.
#[derive(Clone)]
pub struct CardService {
    store: Arc<dyn CardStore>,
    timeout: Duration,
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl CardService {
    pub fn new(store: Arc<dyn CardStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Load a card and check that `user_id` owns it
    async fn owned_card(&self, user_id: Uuid, card_id: Uuid) -> Result<Card> {
        let card = bounded(self.timeout, "get_card", self.store.get_card(card_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Card {}", card_id)))?;

        if card.owner_id != user_id {
            log::warn!("User {} tried to access card {} of another user", user_id, card_id);
            return Err(ServiceError::Forbidden(card_id));
        }
        Ok(card)
    }

    pub async fn create_card(&self, user_id: Uuid, content: NewCard) -> Result<Card> {
        require_text("word", &content.word)?;
        require_text("definition", &content.definition)?;

        let card = Card::new(user_id, content, Utc::now());
        bounded(self.timeout, "insert_card", self.store.insert_card(&card)).await?;

        log::info!("Created card {} for user {}", card.id, user_id);
        Ok(card)
    }

    pub async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> Result<Card> {
        self.owned_card(user_id, card_id).await
    }

    /// A page of the user's cards, oldest first
    pub async fn list_cards(&self, user_id: Uuid, skip: usize, limit: usize) -> Result<Vec<Card>> {
        let cards = bounded(
            self.timeout,
            "list_cards_by_owner",
            self.store.list_cards_by_owner(user_id),
        )
        .await?;

        Ok(cards
            .into_iter()
            .skip(skip)
            .take(limit.min(MAX_PAGE_SIZE))
            .collect())
    }

    /// Edit a card's content; scheduling state is left as it is
    pub async fn update_card(&self, user_id: Uuid, card_id: Uuid, update: CardUpdate) -> Result<Card> {
        if let Some(word) = &update.word {
            require_text("word", word)?;
        }
        if let Some(definition) = &update.definition {
            require_text("definition", definition)?;
        }

        let card = self.owned_card(user_id, card_id).await?;
        if update.is_empty() {
            return Ok(card);
        }

        bounded(
            self.timeout,
            "update_card_content",
            self.store.update_card_content(card_id, &update, Utc::now()),
        )
        .await
    }

    pub async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> Result<()> {
        self.owned_card(user_id, card_id).await?;
        bounded(self.timeout, "delete_card", self.store.delete_card(card_id)).await?;

        log::info!("Deleted card {} for user {}", card_id, user_id);
        Ok(())
    }

    /// Cards due at `as_of`, longest overdue first
    pub async fn due_cards(&self, user_id: Uuid, as_of: DateTime<Utc>) -> Result<Vec<Card>> {
        let cards = bounded(
            self.timeout,
            "list_cards_by_owner",
            self.store.list_cards_by_owner(user_id),
        )
        .await?;

        let mut due: Vec<Card> = cards.into_iter().filter(|c| c.is_due_at(as_of)).collect();
        due.sort_by(|a, b| a.next_review.cmp(&b.next_review));
        Ok(due)
    }

    /// Review history of one card, oldest first
    pub async fn card_reviews(&self, user_id: Uuid, card_id: Uuid) -> Result<Vec<Review>> {
        self.owned_card(user_id, card_id).await?;
        bounded(
            self.timeout,
            "list_reviews_for_card",
            self.store.list_reviews_for_card(card_id),
        )
        .await
    }

    /// Review a card now
    pub async fn review(&self, user_id: Uuid, card_id: Uuid, rating: i64) -> Result<Card> {
        self.review_at(user_id, card_id, rating, Utc::now())
            .await
            .map(|outcome| outcome.card)
    }

    /// Review a card at `now`.
    ///
    /// The rating is validated before anything is read. The card's version
    /// is captured on read and the commit only succeeds if no other review
    /// committed in between; otherwise `ServiceError::Conflict` is returned
    /// and nothing is written.
    pub async fn review_at(
        &self,
        user_id: Uuid,
        card_id: Uuid,
        rating: i64,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        let rating = Rating::new(rating)?;
        let card = self.owned_card(user_id, card_id).await?;

        let planned = apply_review(&card, rating, now);
        let deadline = Instant::now() + self.timeout;
        let committed = self
            .store
            .commit_review(
                card.id,
                card.version,
                &planned.card.schedule(),
                &planned.review,
                deadline,
            )
            .await
            .map_err(ServiceError::from)
            .map_err(|err| {
                if let ServiceError::Conflict(_) = err {
                    log::debug!("Review of card {} lost a race, version {}", card_id, card.version);
                }
                err
            })?;

        log::info!(
            "Card {} reviewed with rating {}: count {} -> {}, status {}, next in {}h",
            card_id,
            rating,
            card.review_count,
            committed.review_count,
            committed.status,
            planned.review.next_interval
        );

        Ok(ReviewOutcome {
            card: committed,
            review: planned.review,
        })
    }
}
