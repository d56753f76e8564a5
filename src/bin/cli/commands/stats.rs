use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, user: Uuid, format: &OutputFormat) -> Result<()> {
    let stats = app.statistics.get_statistics(user, Utc::now()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Plain => {
            println!("Cards: {}  (due now: {})", stats.total_cards, stats.due_cards);
            println!(
                "  learning {}  reviewing {}  mastered {}",
                stats.learning_cards, stats.reviewing_cards, stats.mastered_cards
            );

            println!("Ratings:");
            let widest = stats.review_ratings.iter().map(|r| r.count).max().unwrap_or(0);
            for entry in &stats.review_ratings {
                let bar_len = if widest == 0 { 0 } else { entry.count * 30 / widest };
                println!("  {} {:>5} {}", entry.rating, entry.count, "#".repeat(bar_len));
            }

            let reviewed: Vec<_> = stats.daily_reviews.iter().filter(|d| d.count > 0).collect();
            let total: usize = reviewed.iter().map(|d| d.count).sum();
            println!("Reviews in the last {} days: {}", stats.daily_reviews.len(), total);
            for day in reviewed {
                println!("  {}  {}", day.date, day.count);
            }
        }
    }
    Ok(())
}
