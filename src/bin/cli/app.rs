use anyhow::{Context, Result};
use uuid::Uuid;

use lexicard_lib::config::Config;
use lexicard_lib::flashcards::{CardService, StatisticsService};
use lexicard_lib::notifications::NotificationService;
use lexicard_lib::storage::Stores;

/// Shared application state for CLI commands
pub struct App {
    pub config: Config,
    pub cards: CardService,
    pub statistics: StatisticsService,
    pub notifications: NotificationService,
}

impl App {
    /// Open the configured store and build the services on top of it
    pub fn new(config: Config) -> Result<Self> {
        let stores = Stores::open(&config.storage).context("Failed to open card store")?;
        let timeout = config.storage.timeout();

        Ok(Self {
            cards: CardService::new(stores.cards.clone(), timeout),
            statistics: StatisticsService::new(stores.cards.clone(), timeout),
            notifications: NotificationService::new(stores.settings.clone(), timeout),
            config,
        })
    }
}

/// Card commands act on behalf of a user given with `--user`
pub fn require_user(user: Option<Uuid>) -> Result<Uuid> {
    user.context("This command needs --user <UUID>")
}
