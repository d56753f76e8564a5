use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use lexicard_lib::flashcards::algorithm::{format_interval, preview_intervals};
use lexicard_lib::flashcards::{Card, CardUpdate, NewCard, Rating};

use crate::app::App;
use crate::OutputFormat;

/// Optional content edits from the command line
pub struct EditArgs {
    pub word: Option<String>,
    pub definition: Option<String>,
    pub example: Option<String>,
    pub notes: Option<String>,
}

impl EditArgs {
    /// An empty string clears an optional field
    fn into_update(self) -> CardUpdate {
        let clearable = |value: Option<String>| value.map(|v| if v.is_empty() { None } else { Some(v) });
        CardUpdate {
            word: self.word,
            definition: self.definition,
            example: clearable(self.example),
            notes: clearable(self.notes),
        }
    }
}

fn print_card_line(card: &Card) {
    let now = Utc::now();
    let due = if card.is_due_at(now) {
        "due now".to_string()
    } else {
        let hours = (card.next_review - now).num_minutes() as f64 / 60.0;
        format!("due in {}", format_interval(hours))
    };
    println!(
        "{}  {:<20} [{}] reviews: {}  {}",
        card.id, card.word, card.status, card.review_count, due
    );
}

fn print_cards(cards: &[Card], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(cards)?);
        }
        OutputFormat::Plain => {
            if cards.is_empty() {
                println!("(no cards)");
            }
            for card in cards {
                print_card_line(card);
            }
        }
    }
    Ok(())
}

fn print_card(card: &Card, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(card)?),
        OutputFormat::Plain => {
            println!("{} ({})", card.word, card.id);
            println!("  {}", card.definition);
            if let Some(example) = &card.example {
                println!("  Example: {}", example);
            }
            if let Some(notes) = &card.notes {
                println!("  Notes: {}", notes);
            }
            println!(
                "  Status: {}  Reviews: {}  Next review: {}",
                card.status,
                card.review_count,
                card.next_review.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }
    Ok(())
}

pub async fn run_add(
    app: &App,
    user: Uuid,
    word: String,
    definition: String,
    example: Option<String>,
    notes: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let card = app
        .cards
        .create_card(user, NewCard { word, definition, example, notes })
        .await?;
    print_card(&card, format)
}

pub async fn run_list(app: &App, user: Uuid, skip: usize, limit: usize, format: &OutputFormat) -> Result<()> {
    let cards = app.cards.list_cards(user, skip, limit).await?;
    print_cards(&cards, format)
}

pub async fn run_due(app: &App, user: Uuid, format: &OutputFormat) -> Result<()> {
    let cards = app.cards.due_cards(user, Utc::now()).await?;
    print_cards(&cards, format)
}

pub async fn run_show(app: &App, user: Uuid, card_id: Uuid, format: &OutputFormat) -> Result<()> {
    let card = app.cards.get_card(user, card_id).await?;
    let reviews = app.cards.card_reviews(user, card_id).await?;
    let preview = preview_intervals(card.review_count);

    match format {
        OutputFormat::Json => {
            let preview_json: Vec<_> = Rating::all()
                .zip(preview)
                .map(|(rating, hours)| serde_json::json!({ "rating": rating.value(), "intervalHours": hours }))
                .collect();
            let output = serde_json::json!({
                "card": card,
                "reviews": reviews,
                "nextIntervals": preview_json,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            print_card(&card, format)?;

            let upcoming: Vec<String> = Rating::all()
                .zip(preview)
                .map(|(rating, hours)| format!("{}={}", rating, format_interval(hours)))
                .collect();
            println!("  If reviewed now: {}", upcoming.join("  "));

            if reviews.is_empty() {
                println!("  (never reviewed)");
            } else {
                println!("  History:");
                for review in &reviews {
                    println!(
                        "    {}  rating {}  next in {}h",
                        review.review_date.format("%Y-%m-%d %H:%M"),
                        review.rating,
                        review.next_interval
                    );
                }
            }
        }
    }
    Ok(())
}

pub async fn run_edit(
    app: &App,
    user: Uuid,
    card_id: Uuid,
    edit: EditArgs,
    format: &OutputFormat,
) -> Result<()> {
    let card = app.cards.update_card(user, card_id, edit.into_update()).await?;
    print_card(&card, format)
}

pub async fn run_delete(app: &App, user: Uuid, card_id: Uuid, format: &OutputFormat) -> Result<()> {
    app.cards.delete_card(user, card_id).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "deleted": card_id })),
        OutputFormat::Plain => println!("Deleted {}", card_id),
    }
    Ok(())
}
