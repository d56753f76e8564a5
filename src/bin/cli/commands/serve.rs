use std::sync::Arc;

use anyhow::{Context, Result};

use lexicard_lib::notifications::LogNotifier;
use lexicard_lib::server::{self, AppState};

use crate::app::App;

pub async fn run(app: &App) -> Result<()> {
    let state = AppState {
        cards: app.cards.clone(),
        statistics: app.statistics.clone(),
        notifications: app.notifications.clone(),
        notifier: Arc::new(LogNotifier),
    };

    server::serve(&app.config, state)
        .await
        .with_context(|| format!("Server on {} failed", app.config.server.bind))
}
