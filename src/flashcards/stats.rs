//! Study statistics
//!
//! All day buckets are UTC calendar days. The trailing window covers
//! `TREND_DAYS` days ending on the day of `as_of`, oldest day first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use uuid::Uuid;

use super::models::{
    Card, CardStatus, DailyReviewCount, Rating, RatingCount, Review, Statistics, StatusTrendPoint,
};
use crate::error::Result;
use crate::storage::{bounded, CardStore};

/// Length of the daily review and status trend series
pub const TREND_DAYS: i64 = 30;

/// The days of the trailing window, oldest first
fn window_days(as_of: DateTime<Utc>) -> Vec<NaiveDate> {
    let today = as_of.date_naive();
    (0..TREND_DAYS)
        .rev()
        .map(|back| today - ChronoDuration::days(back))
        .collect()
}

/// Build a statistics snapshot from one user's cards and reviews.
/// Reviews dated after `as_of` are ignored.
pub fn aggregate(cards: &[Card], reviews: &[Review], as_of: DateTime<Utc>) -> Statistics {
    let mut stats = Statistics {
        total_cards: cards.len(),
        ..Default::default()
    };

    for card in cards {
        match card.status {
            CardStatus::Learning => stats.learning_cards += 1,
            CardStatus::Reviewing => stats.reviewing_cards += 1,
            CardStatus::Mastered => stats.mastered_cards += 1,
        }
        if card.is_due_at(as_of) {
            stats.due_cards += 1;
        }
    }

    let days = window_days(as_of);

    let mut reviews_per_day: HashMap<NaiveDate, usize> = HashMap::new();
    let mut per_rating = [0usize; Rating::MAX as usize];
    for review in reviews.iter().filter(|r| r.review_date <= as_of) {
        *reviews_per_day.entry(review.review_date.date_naive()).or_insert(0) += 1;
        per_rating[(review.rating.value() - Rating::MIN) as usize] += 1;
    }

    stats.daily_reviews = days
        .iter()
        .map(|date| DailyReviewCount {
            date: *date,
            count: reviews_per_day.get(date).copied().unwrap_or(0),
        })
        .collect();

    stats.review_ratings = Rating::all()
        .zip(per_rating)
        .map(|(rating, count)| RatingCount {
            rating: rating.value(),
            count,
        })
        .collect();

    stats.card_status_trend = days
        .iter()
        .map(|date| {
            let mut point = StatusTrendPoint {
                date: *date,
                learning: 0,
                reviewing: 0,
                mastered: 0,
            };
            for card in cards.iter().filter(|c| c.created_at.date_naive() <= *date) {
                match card.status {
                    CardStatus::Learning => point.learning += 1,
                    CardStatus::Reviewing => point.reviewing += 1,
                    CardStatus::Mastered => point.mastered += 1,
                }
            }
            point
        })
        .collect();

    stats
}

/// Read-only statistics queries
#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn CardStore>,
    timeout: Duration,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn CardStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Statistics for `user_id` as of the given instant.
    ///
    /// Cards and reviews are read separately, so a review committed between
    /// the two reads may show up in one part of the snapshot only.
    pub async fn get_statistics(&self, user_id: Uuid, as_of: DateTime<Utc>) -> Result<Statistics> {
        let cards = bounded(
            self.timeout,
            "list_cards_by_owner",
            self.store.list_cards_by_owner(user_id),
        )
        .await?;
        let reviews = bounded(
            self.timeout,
            "list_reviews_by_owner",
            self.store.list_reviews_by_owner(user_id),
        )
        .await?;

        log::debug!(
            "Statistics for {}: {} cards, {} reviews",
            user_id,
            cards.len(),
            reviews.len()
        );
        Ok(aggregate(&cards, &reviews, as_of))
    }
}
