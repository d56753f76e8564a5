//! SQLite store
//!
//! Timestamps are stored as RFC 3339 text with nanosecond precision so that
//! lexical order matches chronological order. Ids are hyphenated UUID text.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task::JoinError;
use tokio::time::Instant;
use uuid::Uuid;

use super::{CardStore, Result, SettingsStore, StoreError};
use crate::flashcards::models::{Card, CardStatus, CardUpdate, Rating, Review, ScheduleUpdate};
use crate::notifications::models::NotificationSettings;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS cards (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        word TEXT NOT NULL,
        definition TEXT NOT NULL,
        example TEXT,
        notes TEXT,
        review_count INTEGER NOT NULL DEFAULT 0,
        next_review TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'learning',
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        card_id TEXT NOT NULL,
        rating INTEGER NOT NULL,
        review_date TEXT NOT NULL,
        next_interval INTEGER NOT NULL,
        FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS notification_settings (
        user_id TEXT PRIMARY KEY,
        settings TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_cards_owner_id ON cards(owner_id);
    CREATE INDEX IF NOT EXISTS idx_reviews_card_id ON reviews(card_id);
    CREATE INDEX IF NOT EXISTS idx_reviews_review_date ON reviews(review_date);
"#;

const CARD_COLUMNS: &str = "id, owner_id, word, definition, example, notes, review_count, \
     next_review, status, version, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, card_id, rating, review_date, next_interval";

/// Store backed by a single SQLite connection.
///
/// Calls run on tokio's blocking pool; the connection mutex serializes them.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(task_failed)?
    }

    /// Like `with_conn`, but gives up if the connection is not free by
    /// `deadline`. Once `f` has started it runs to completion and its result
    /// is returned even if that happens after the deadline.
    async fn with_conn_until<T, F>(&self, deadline: Instant, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let state = Arc::new(Mutex::new(WriteState::Waiting));
        let task_state = Arc::clone(&state);

        let mut task = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            {
                let mut state = task_state.lock().map_err(|_| state_poisoned())?;
                if *state == WriteState::Abandoned {
                    return Err(StoreError::Unavailable(
                        "deadline passed while waiting for the connection".to_string(),
                    ));
                }
                *state = WriteState::Started;
            }
            f(&mut guard)
        });

        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(joined) => joined.map_err(task_failed)?,
            Err(_) => {
                let started = {
                    let mut state = state.lock().map_err(|_| state_poisoned())?;
                    if *state == WriteState::Waiting {
                        *state = WriteState::Abandoned;
                        false
                    } else {
                        true
                    }
                };
                if !started {
                    return Err(StoreError::Unavailable(
                        "deadline passed while waiting for the connection".to_string(),
                    ));
                }
                log::debug!("Write started before its deadline, waiting for it to finish");
                task.await.map_err(task_failed)?
            }
        }
    }
}

/// Progress of a deadline-bound write, shared with its blocking task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Waiting,
    Started,
    Abandoned,
}

fn task_failed(err: JoinError) -> StoreError {
    StoreError::Unavailable(format!("store task failed: {}", err))
}

fn state_poisoned() -> StoreError {
    StoreError::Unavailable("write state lock poisoned".to_string())
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("id '{}': {}", value, e)))
}

/// Raw column values of a `cards` row
struct CardRow {
    id: String,
    owner_id: String,
    word: String,
    definition: String,
    example: Option<String>,
    notes: Option<String>,
    review_count: i64,
    next_review: String,
    status: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl CardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            word: row.get(2)?,
            definition: row.get(3)?,
            example: row.get(4)?,
            notes: row.get(5)?,
            review_count: row.get(6)?,
            next_review: row.get(7)?,
            status: row.get(8)?,
            version: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_card(self) -> Result<Card> {
        Ok(Card {
            id: parse_uuid(&self.id)?,
            owner_id: parse_uuid(&self.owner_id)?,
            word: self.word,
            definition: self.definition,
            example: self.example,
            notes: self.notes,
            review_count: u32::try_from(self.review_count)
                .map_err(|_| StoreError::Corrupt(format!("review_count {}", self.review_count)))?,
            next_review: parse_timestamp(&self.next_review)?,
            status: self
                .status
                .parse::<CardStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            version: u64::try_from(self.version)
                .map_err(|_| StoreError::Corrupt(format!("version {}", self.version)))?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Raw column values of a `reviews` row
struct ReviewRow {
    id: String,
    card_id: String,
    rating: i64,
    review_date: String,
    next_interval: i64,
}

impl ReviewRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            card_id: row.get(1)?,
            rating: row.get(2)?,
            review_date: row.get(3)?,
            next_interval: row.get(4)?,
        })
    }

    fn into_review(self) -> Result<Review> {
        Ok(Review {
            id: parse_uuid(&self.id)?,
            card_id: parse_uuid(&self.card_id)?,
            rating: Rating::new(self.rating).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            review_date: parse_timestamp(&self.review_date)?,
            next_interval: self.next_interval,
        })
    }
}

fn select_card(conn: &Connection, card_id: Uuid) -> Result<Option<Card>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
            params![card_id.to_string()],
            CardRow::from_row,
        )
        .optional()?;
    row.map(CardRow::into_card).transpose()
}

fn write_card_content(conn: &Connection, card: &Card) -> Result<()> {
    conn.execute(
        "UPDATE cards SET word = ?1, definition = ?2, example = ?3, notes = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            card.word,
            card.definition,
            card.example,
            card.notes,
            timestamp(&card.updated_at),
            card.id.to_string(),
        ],
    )?;
    Ok(())
}

fn collect_reviews(conn: &Connection, sql: &str, key: Uuid) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![key.to_string()], ReviewRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ReviewRow::into_review).collect()
}

#[async_trait]
impl CardStore for SqliteStore {
    async fn insert_card(&self, card: &Card) -> Result<()> {
        let card = card.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO cards ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    CARD_COLUMNS
                ),
                params![
                    card.id.to_string(),
                    card.owner_id.to_string(),
                    card.word,
                    card.definition,
                    card.example,
                    card.notes,
                    card.review_count as i64,
                    timestamp(&card.next_review),
                    card.status.as_str(),
                    card.version as i64,
                    timestamp(&card.created_at),
                    timestamp(&card.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Card>> {
        self.with_conn(move |conn| select_card(conn, card_id)).await
    }

    async fn list_cards_by_owner(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cards WHERE owner_id = ?1 ORDER BY created_at, id",
                CARD_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![owner_id.to_string()], CardRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(CardRow::into_card).collect()
        })
        .await
    }

    async fn update_card_content(
        &self,
        card_id: Uuid,
        update: &CardUpdate,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let update = update.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut card = select_card(&tx, card_id)?.ok_or(StoreError::CardNotFound(card_id))?;
            update.apply_to(&mut card, now);
            write_card_content(&tx, &card)?;
            tx.commit()?;
            Ok(card)
        })
        .await
    }

    async fn delete_card(&self, card_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM reviews WHERE card_id = ?1",
                params![card_id.to_string()],
            )?;
            let deleted = tx.execute("DELETE FROM cards WHERE id = ?1", params![card_id.to_string()])?;
            if deleted == 0 {
                return Err(StoreError::CardNotFound(card_id));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn commit_review(
        &self,
        card_id: Uuid,
        expected_version: u64,
        schedule: &ScheduleUpdate,
        review: &Review,
        deadline: Instant,
    ) -> Result<Card> {
        let schedule = *schedule;
        let review = review.clone();
        self.with_conn_until(deadline, move |conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE cards SET review_count = ?1, next_review = ?2, status = ?3, version = version + 1
                 WHERE id = ?4 AND version = ?5",
                params![
                    schedule.review_count as i64,
                    timestamp(&schedule.next_review),
                    schedule.status.as_str(),
                    card_id.to_string(),
                    expected_version as i64,
                ],
            )?;

            if updated == 0 {
                // Dropping the transaction rolls it back
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cards WHERE id = ?1)",
                    params![card_id.to_string()],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    StoreError::Conflict(card_id)
                } else {
                    StoreError::CardNotFound(card_id)
                });
            }

            tx.execute(
                &format!("INSERT INTO reviews ({}) VALUES (?1, ?2, ?3, ?4, ?5)", REVIEW_COLUMNS),
                params![
                    review.id.to_string(),
                    card_id.to_string(),
                    review.rating.value() as i64,
                    timestamp(&review.review_date),
                    review.next_interval,
                ],
            )?;

            let card = select_card(&tx, card_id)?.ok_or(StoreError::CardNotFound(card_id))?;
            tx.commit()?;
            Ok(card)
        })
        .await
    }

    async fn list_reviews_for_card(&self, card_id: Uuid) -> Result<Vec<Review>> {
        self.with_conn(move |conn| {
            collect_reviews(
                conn,
                &format!(
                    "SELECT {} FROM reviews WHERE card_id = ?1 ORDER BY review_date, id",
                    REVIEW_COLUMNS
                ),
                card_id,
            )
        })
        .await
    }

    async fn list_reviews_by_owner(&self, owner_id: Uuid) -> Result<Vec<Review>> {
        self.with_conn(move |conn| {
            collect_reviews(
                conn,
                "SELECT r.id, r.card_id, r.rating, r.review_date, r.next_interval
                 FROM reviews r
                 JOIN cards c ON c.id = r.card_id
                 WHERE c.owner_id = ?1
                 ORDER BY r.review_date, r.id",
                owner_id,
            )
        })
        .await
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get_settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>> {
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT settings FROM notification_settings WHERE user_id = ?1",
                    params![user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let user_id = settings.user_id;
        let json = serde_json::to_string(settings)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO notification_settings (user_id, settings) VALUES (?1, ?2)",
                params![user_id.to_string(), json],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::models::NewCard;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("data").join("lexicard.db")).unwrap();
        (store, temp_dir)
    }

    fn card_for(owner_id: Uuid, word: &str, created_at: DateTime<Utc>) -> Card {
        Card::new(
            owner_id,
            NewCard {
                word: word.to_string(),
                definition: format!("definition of {}", word),
                example: Some(format!("An example using {}.", word)),
                notes: None,
            },
            created_at,
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + std::time::Duration::from_secs(5)
    }

    fn next_schedule(card: &Card, status: CardStatus) -> ScheduleUpdate {
        ScheduleUpdate {
            review_count: card.review_count + 1,
            next_review: card.next_review + Duration::minutes(90),
            status,
        }
    }

    #[tokio::test]
    async fn test_card_round_trip_preserves_timestamps() {
        let (store, _temp) = create_test_store();
        let card = card_for(Uuid::new_v4(), "limerence", Utc::now());

        store.insert_card(&card).await.unwrap();
        let loaded = store.get_card(card.id).await.unwrap().unwrap();

        assert_eq!(loaded, card);
        assert!(store.get_card(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_cards_by_owner_oldest_first() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

        let later = card_for(owner, "later", start + Duration::days(2));
        let earlier = card_for(owner, "earlier", start);
        let other = card_for(Uuid::new_v4(), "other", start);
        for card in [&later, &earlier, &other] {
            store.insert_card(card).await.unwrap();
        }

        let words: Vec<String> = store
            .list_cards_by_owner(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.word)
            .collect();
        assert_eq!(words, vec!["earlier".to_string(), "later".to_string()]);
    }

    #[tokio::test]
    async fn test_commit_review_is_version_checked() {
        let (store, _temp) = create_test_store();
        let card = card_for(Uuid::new_v4(), "eunoia", Utc::now());
        store.insert_card(&card).await.unwrap();

        let review = Review::new(card.id, Rating::new(5).unwrap(), Utc::now(), 1);
        let committed = store
            .commit_review(card.id, 0, &next_schedule(&card, CardStatus::Reviewing), &review, far_deadline())
            .await
            .unwrap();
        assert_eq!(committed.version, 1);
        assert_eq!(committed.review_count, 1);
        assert_eq!(committed.status, CardStatus::Reviewing);

        let stale = Review::new(card.id, Rating::new(1).unwrap(), Utc::now(), 1);
        let err = store
            .commit_review(card.id, 0, &next_schedule(&card, CardStatus::Reviewing), &stale, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let history = store.list_reviews_for_card(card.id).await.unwrap();
        assert_eq!(history, vec![review]);

        let missing = store
            .commit_review(Uuid::new_v4(), 0, &next_schedule(&card, CardStatus::Reviewing), &stale, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::CardNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_content_keeps_schedule() {
        let (store, _temp) = create_test_store();
        let card = card_for(Uuid::new_v4(), "sillage", Utc::now());
        store.insert_card(&card).await.unwrap();

        let update = CardUpdate {
            definition: Some("the scent that lingers".to_string()),
            example: Some(None),
            ..Default::default()
        };
        let edited = store
            .update_card_content(card.id, &update, Utc::now())
            .await
            .unwrap();

        assert_eq!(edited.definition, "the scent that lingers");
        assert_eq!(edited.example, None);
        assert_eq!(edited.review_count, card.review_count);
        assert_eq!(edited.next_review, card.next_review);
        assert_eq!(edited.version, card.version);
        assert_eq!(store.get_card(card.id).await.unwrap().unwrap(), edited);
    }

    #[tokio::test]
    async fn test_delete_cascades_reviews() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();
        let card = card_for(owner, "komorebi", Utc::now());
        store.insert_card(&card).await.unwrap();
        let review = Review::new(card.id, Rating::new(3).unwrap(), Utc::now(), 1);
        store
            .commit_review(card.id, 0, &next_schedule(&card, CardStatus::Reviewing), &review, far_deadline())
            .await
            .unwrap();

        store.delete_card(card.id).await.unwrap();

        assert!(store.list_reviews_by_owner(owner).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_card(card.id).await,
            Err(StoreError::CardNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_blocked_past_deadline_writes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.db_path().is_none());
        let card = card_for(Uuid::new_v4(), "sonder", Utc::now());
        store.insert_card(&card).await.unwrap();

        let conn = Arc::clone(&store.conn);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let review = Review::new(card.id, Rating::new(4).unwrap(), Utc::now(), 1);
        let deadline = Instant::now() + std::time::Duration::from_millis(100);
        let err = store
            .commit_review(card.id, 0, &next_schedule(&card, CardStatus::Reviewing), &review, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        holder.join().unwrap();
        // Give the abandoned task time to take and release the connection
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let stored = store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!((stored.review_count, stored.version), (0, 0));
        assert!(store.list_reviews_for_card(card.id).await.unwrap().is_empty());

        // A retry after the outage commits exactly once
        let committed = store
            .commit_review(card.id, 0, &next_schedule(&card, CardStatus::Reviewing), &review, far_deadline())
            .await
            .unwrap();
        assert_eq!(committed.review_count, 1);
        assert_eq!(store.list_reviews_for_card(card.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let (store, _temp) = create_test_store();
        let user = Uuid::new_v4();
        assert!(store.get_settings(user).await.unwrap().is_none());

        let mut settings = NotificationSettings::defaults_for(user);
        settings.push_notifications = false;
        store.put_settings(&settings).await.unwrap();
        store.put_settings(&settings).await.unwrap();

        assert_eq!(store.get_settings(user).await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lexicard.db");
        let card = card_for(Uuid::new_v4(), "saudade", Utc::now());
        {
            let store = SqliteStore::open(path.clone()).unwrap();
            store.insert_card(&card).await.unwrap();
        }

        let reopened = SqliteStore::open(path.clone()).unwrap();
        assert_eq!(reopened.db_path(), Some(&path));
        assert_eq!(reopened.get_card(card.id).await.unwrap(), Some(card));
    }
}
