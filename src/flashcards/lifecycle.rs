//! Card lifecycle: turns a card and a rating into the next card state and
//! the review record that explains it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::algorithm::calculate_next_review;
use super::models::{Card, Rating, Review, ScheduleUpdate};

/// A card after a review, together with the review that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub card: Card,
    pub review: Review,
}

/// Compute the result of reviewing `card` with `rating` at `now`.
///
/// Nothing is persisted. The returned card has its scheduling fields and
/// version advanced; content fields are untouched.
pub fn apply_review(card: &Card, rating: Rating, now: DateTime<Utc>) -> ReviewOutcome {
    let result = calculate_next_review(card.review_count, rating, now);

    let mut next = card.clone();
    next.apply_schedule(&ScheduleUpdate {
        review_count: result.review_count,
        next_review: result.next_review,
        status: result.status,
    });

    ReviewOutcome {
        card: next,
        review: Review::new(card.id, rating, now, result.next_interval),
    }
}
