use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use lexicard_lib::flashcards::algorithm::format_interval;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, user: Uuid, card_id: Uuid, rating: i64, format: &OutputFormat) -> Result<()> {
    let outcome = app.cards.review_at(user, card_id, rating, Utc::now()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Plain => {
            let card = &outcome.card;
            let hours = (card.next_review - outcome.review.review_date).num_seconds() as f64 / 3600.0;
            println!(
                "{}: rated {}, next review in {} ({})",
                card.word,
                outcome.review.rating,
                format_interval(hours),
                card.next_review.format("%Y-%m-%d %H:%M UTC")
            );
            println!("Status: {}  Reviews: {}", card.status, card.review_count);
        }
    }
    Ok(())
}
