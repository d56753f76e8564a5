//! Forgetting-curve review scheduling
//!
//! Each card walks an accelerating table of review intervals, one step per
//! review. The rating stretches or shrinks the step:
//! - 1-2: recalled poorly, interval halved
//! - 3: recalled with some effort, interval unchanged
//! - 4-5: recalled well, interval multiplied by 1.5
//!
//! Intervals never drop below one hour.

use chrono::{DateTime, Duration, Utc};

use super::models::{CardStatus, Rating};

/// Base intervals in hours, indexed by the number of earlier reviews
pub const INTERVAL_TABLE_HOURS: [f64; 12] = [
    5.0 / 60.0, // 5 minutes
    0.5,        // 30 minutes
    12.0,       // 12 hours
    24.0,       // 1 day
    48.0,       // 2 days
    72.0,       // 3 days
    120.0,      // 5 days
    168.0,      // 7 days
    336.0,      // 14 days
    720.0,      // 30 days
    1440.0,     // 60 days
    2880.0,     // 120 days
];

/// Minimum interval returned by the model
pub const MIN_INTERVAL_HOURS: f64 = 1.0;

/// Review count at which a card counts as mastered
pub const MASTERED_AFTER: u32 = 5;

/// Result of scheduling one review
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    /// Interval until the next review, in fractional hours
    pub interval_hours: f64,
    /// Whole hours recorded on the review for auditing
    pub next_interval: i64,
    pub next_review: DateTime<Utc>,
    pub review_count: u32,
    pub status: CardStatus,
}

/// Table interval for a card reviewed `review_count` times before.
/// Counts past the end of the table stay on the last entry.
pub fn base_interval_hours(review_count: u32) -> f64 {
    let index = (review_count as usize).min(INTERVAL_TABLE_HOURS.len() - 1);
    INTERVAL_TABLE_HOURS[index]
}

/// Multiplier applied to the base interval for a rating
pub fn rating_multiplier(rating: Rating) -> f64 {
    match rating.value() {
        4..=5 => 1.5,
        3 => 1.0,
        _ => 0.5,
    }
}

/// Hours until the next review of a card reviewed `review_count` times
/// before, given this review's rating
pub fn interval_hours(review_count: u32, rating: Rating) -> f64 {
    (base_interval_hours(review_count) * rating_multiplier(rating)).max(MIN_INTERVAL_HOURS)
}

/// Lifecycle status for a card that has been reviewed `review_count` times
pub fn status_for_review_count(review_count: u32) -> CardStatus {
    match review_count {
        0 => CardStatus::Learning,
        n if n < MASTERED_AFTER => CardStatus::Reviewing,
        _ => CardStatus::Mastered,
    }
}

/// Calculate the scheduling state that follows a review
///
/// # Arguments
/// * `review_count` - Reviews committed before this one
/// * `rating` - Rating given in this review
/// * `now` - When the review happens
pub fn calculate_next_review(review_count: u32, rating: Rating, now: DateTime<Utc>) -> ReviewResult {
    let hours = interval_hours(review_count, rating);
    let review_count = review_count.saturating_add(1);

    ReviewResult {
        interval_hours: hours,
        next_interval: hours.floor() as i64,
        next_review: now + hours_to_duration(hours),
        review_count,
        status: status_for_review_count(review_count),
    }
}

/// Interval each rating 1-5 would produce, lowest rating first
pub fn preview_intervals(review_count: u32) -> [f64; 5] {
    let mut preview = [0.0; 5];
    for (slot, rating) in preview.iter_mut().zip(Rating::all()) {
        *slot = interval_hours(review_count, rating);
    }
    preview
}

fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Format an interval in hours to a short human-readable string
pub fn format_interval(hours: f64) -> String {
    if hours < 1.0 {
        format!("{}m", (hours * 60.0).round() as i64)
    } else if hours < 24.0 {
        format!("{}h", hours.floor() as i64)
    } else {
        let days = (hours / 24.0).floor() as i64;
        if days < 7 {
            format!("{}d", days)
        } else if days < 30 {
            format!("{}w", days / 7)
        } else if days < 365 {
            format!("{}mo", days / 30)
        } else {
            format!("{}y", days / 365)
        }
    }
}
