use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::UsageQuota;

/// Backing store for daily usage quotas
///
/// Each primitive must be atomic per subject; `increment_with_ceiling` is the
/// one the governor relies on to keep `consumed <= daily_limit`.
#[async_trait::async_trait]
pub trait QuotaStore: Send + Sync {
    /// Inserts `seed` if the subject has no row yet and returns the stored row
    ///
    /// An existing row keeps its counters but takes `is_privileged` from `seed`.
    async fn load_or_create(&self, seed: &UsageQuota) -> AppResult<UsageQuota>;

    /// Zeroes `consumed` and moves `reset_at` to `next_reset` if the row is due
    async fn roll_over(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> AppResult<UsageQuota>;

    /// Increments `consumed` only if privileged or below the limit; `None` when at the ceiling
    async fn increment_with_ceiling(&self, subject: &str) -> AppResult<Option<UsageQuota>>;
}

/// Process-local quota store
#[derive(Default)]
pub struct MemoryQuotaStore {
    rows: Mutex<HashMap<String, UsageQuota>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a row wholesale; used to seed fixtures and admin overrides
    pub async fn put(&self, quota: UsageQuota) {
        self.rows.lock().await.insert(quota.subject.clone(), quota);
    }
}

#[async_trait::async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn load_or_create(&self, seed: &UsageQuota) -> AppResult<UsageQuota> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry(seed.subject.clone())
            .or_insert_with(|| seed.clone());
        row.is_privileged = seed.is_privileged;
        Ok(row.clone())
    }

    async fn roll_over(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> AppResult<UsageQuota> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(subject)
            .ok_or_else(|| AppError::Internal(format!("No quota row for {}", subject)))?;

        if row.reset_at <= now {
            row.consumed = 0;
            row.reset_at = next_reset;
        }
        Ok(row.clone())
    }

    async fn increment_with_ceiling(&self, subject: &str) -> AppResult<Option<UsageQuota>> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(subject)
            .ok_or_else(|| AppError::Internal(format!("No quota row for {}", subject)))?;

        if !row.has_capacity() {
            return Ok(None);
        }
        row.consumed += 1;
        Ok(Some(row.clone()))
    }
}

#[derive(sqlx::FromRow)]
struct QuotaRow {
    subject: String,
    daily_limit: i32,
    consumed: i32,
    reset_at: DateTime<Utc>,
    is_privileged: bool,
}

impl From<QuotaRow> for UsageQuota {
    fn from(row: QuotaRow) -> Self {
        Self {
            subject: row.subject,
            daily_limit: u32::try_from(row.daily_limit).unwrap_or(0),
            consumed: u32::try_from(row.consumed).unwrap_or(0),
            reset_at: row.reset_at,
            is_privileged: row.is_privileged,
        }
    }
}

const QUOTA_COLUMNS: &str = "subject, daily_limit, consumed, reset_at, is_privileged";

/// Quota store on the `usage_quotas` table; every primitive is a single statement
#[derive(Clone)]
pub struct PgQuotaStore {
    db_pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn fetch(&self, subject: &str) -> AppResult<UsageQuota> {
        let row: QuotaRow = sqlx::query_as(&format!(
            "SELECT {} FROM usage_quotas WHERE subject = $1",
            QUOTA_COLUMNS
        ))
        .bind(subject)
        .fetch_one(&self.db_pool)
        .await?;
        Ok(row.into())
    }
}

#[async_trait::async_trait]
impl QuotaStore for PgQuotaStore {
    async fn load_or_create(&self, seed: &UsageQuota) -> AppResult<UsageQuota> {
        // On conflict only the privileged flag follows the seed; RETURNING yields the row
        let row: QuotaRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO usage_quotas ({cols})
            VALUES ($1, $2, 0, $3, $4)
            ON CONFLICT (subject) DO UPDATE SET is_privileged = EXCLUDED.is_privileged
            RETURNING {cols}
            "#,
            cols = QUOTA_COLUMNS
        ))
        .bind(&seed.subject)
        .bind(i32::try_from(seed.daily_limit).unwrap_or(i32::MAX))
        .bind(seed.reset_at)
        .bind(seed.is_privileged)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(row.into())
    }

    async fn roll_over(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> AppResult<UsageQuota> {
        let rolled: Option<QuotaRow> = sqlx::query_as(&format!(
            r#"
            UPDATE usage_quotas
            SET consumed = 0, reset_at = $3
            WHERE subject = $1 AND reset_at <= $2
            RETURNING {}
            "#,
            QUOTA_COLUMNS
        ))
        .bind(subject)
        .bind(now)
        .bind(next_reset)
        .fetch_optional(&self.db_pool)
        .await?;

        match rolled {
            Some(row) => Ok(row.into()),
            // Another request rolled it first
            None => self.fetch(subject).await,
        }
    }

    async fn increment_with_ceiling(&self, subject: &str) -> AppResult<Option<UsageQuota>> {
        let row: Option<QuotaRow> = sqlx::query_as(&format!(
            r#"
            UPDATE usage_quotas
            SET consumed = consumed + 1
            WHERE subject = $1 AND (is_privileged OR consumed < daily_limit)
            RETURNING {}
            "#,
            QUOTA_COLUMNS
        ))
        .bind(subject)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(UsageQuota::from))
    }
}
