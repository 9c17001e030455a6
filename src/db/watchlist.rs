use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::models::{ContentType, GenreIds, WatchlistEntry};

/// Read-only view of a user's saved watchlist
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn get_watchlist(&self, user_id: &str) -> AppResult<Vec<WatchlistEntry>>;
}

/// Process-local watchlist, mainly for local runs and tests
#[derive(Default)]
pub struct MemoryWatchlistStore {
    entries: RwLock<HashMap<String, Vec<WatchlistEntry>>>,
}

impl MemoryWatchlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user_id: &str, entry: WatchlistEntry) {
        self.entries
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(entry);
    }
}

#[async_trait::async_trait]
impl WatchlistStore for MemoryWatchlistStore {
    async fn get_watchlist(&self, user_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(sqlx::FromRow)]
struct WatchlistRow {
    content_id: i64,
    content_type: String,
    genres: Option<Value>,
}

impl WatchlistRow {
    fn into_entry(self) -> Option<WatchlistEntry> {
        let content_type = match self.content_type.as_str() {
            "movie" => ContentType::Movie,
            "tv" | "series" => ContentType::Series,
            other => {
                tracing::debug!(content_type = %other, "Skipping watchlist row with unknown content type");
                return None;
            }
        };

        Some(WatchlistEntry {
            content_id: u64::try_from(self.content_id).ok()?,
            content_type,
            genres: self
                .genres
                .as_ref()
                .map(GenreIds::from_value)
                .unwrap_or_default(),
        })
    }
}

/// Reads the `watchlist_items` table owned by the watchlist service
#[derive(Clone)]
pub struct PgWatchlistStore {
    db_pool: PgPool,
}

impl PgWatchlistStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait::async_trait]
impl WatchlistStore for PgWatchlistStore {
    async fn get_watchlist(&self, user_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        let rows: Vec<WatchlistRow> = sqlx::query_as(
            r#"
            SELECT content_id, content_type, genres
            FROM watchlist_items
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().filter_map(WatchlistRow::into_entry).collect())
    }
}
