mod app;
mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use lexicard_lib::config::Config;

#[derive(Parser)]
#[command(name = "lexicard-cli", about = "Lexicard vocabulary cards and review scheduler", version)]
struct Cli {
    /// Config file (default: ~/.config/lexicard/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, global = true)]
    user: Option<Uuid>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP daemon
    Serve,

    /// Add a new card
    Add {
        word: String,
        definition: String,
        #[arg(long)]
        example: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// List cards in creation order
    List {
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// List cards due for review now
    Due,

    /// Show a card, its review history and upcoming intervals
    Show { card_id: Uuid },

    /// Edit a card's content (pass "" to clear example or notes)
    Edit {
        card_id: Uuid,
        #[arg(long)]
        word: Option<String>,
        #[arg(long)]
        definition: Option<String>,
        #[arg(long)]
        example: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a card and its reviews
    Delete { card_id: Uuid },

    /// Record a review (rating 1-5)
    Review { card_id: Uuid, rating: i64 },

    /// Show study statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    let app = app::App::new(config)?;

    match cli.command {
        Command::Serve => {
            commands::serve::run(&app).await?;
        }
        Command::Add { word, definition, example, notes } => {
            let user = app::require_user(cli.user)?;
            commands::cards::run_add(&app, user, word, definition, example, notes, &cli.format).await?;
        }
        Command::List { skip, limit } => {
            let user = app::require_user(cli.user)?;
            commands::cards::run_list(&app, user, skip, limit, &cli.format).await?;
        }
        Command::Due => {
            let user = app::require_user(cli.user)?;
            commands::cards::run_due(&app, user, &cli.format).await?;
        }
        Command::Show { card_id } => {
            let user = app::require_user(cli.user)?;
            commands::cards::run_show(&app, user, card_id, &cli.format).await?;
        }
        Command::Edit { card_id, word, definition, example, notes } => {
            let user = app::require_user(cli.user)?;
            let edit = commands::cards::EditArgs { word, definition, example, notes };
            commands::cards::run_edit(&app, user, card_id, edit, &cli.format).await?;
        }
        Command::Delete { card_id } => {
            let user = app::require_user(cli.user)?;
            commands::cards::run_delete(&app, user, card_id, &cli.format).await?;
        }
        Command::Review { card_id, rating } => {
            let user = app::require_user(cli.user)?;
            commands::review::run(&app, user, card_id, rating, &cli.format).await?;
        }
        Command::Stats => {
            let user = app::require_user(cli.user)?;
            commands::stats::run(&app, user, &cli.format).await?;
        }
    }

    Ok(())
}
