use chrono::{DateTime, Days, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::QuotaStore,
    error::{AppError, AppResult},
    models::{QuotaSubject, UsageLimits, UsageQuota},
};

/// Default limits and the privileged allow-list
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub anonymous_daily_limit: u32,
    pub user_daily_limit: u32,
    pub privileged_users: HashSet<String>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            anonymous_daily_limit: 3,
            user_daily_limit: 10,
            privileged_users: HashSet::new(),
        }
    }
}

impl QuotaPolicy {
    /// Row for a subject seen for the first time; `is_privileged` is also
    /// reapplied to existing rows on every load
    fn seed(&self, subject: &QuotaSubject, now: DateTime<Utc>) -> AppResult<UsageQuota> {
        let (daily_limit, is_privileged) = match subject {
            QuotaSubject::Anonymous(_) => (self.anonymous_daily_limit, false),
            QuotaSubject::User(id) => (self.user_daily_limit, self.privileged_users.contains(id)),
        };

        Ok(UsageQuota {
            subject: subject.to_string(),
            daily_limit,
            consumed: 0,
            reset_at: next_reset_after(now)?,
            is_privileged,
        })
    }
}

/// Next UTC midnight strictly after `now`
pub fn next_reset_after(now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| AppError::Internal(format!("No reset instant after {}", now)))
}

/// Daily check-and-increment counter per quota subject
#[derive(Clone)]
pub struct QuotaGovernor {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl QuotaGovernor {
    pub fn new(store: Arc<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn get_limits(&self, subject: &QuotaSubject) -> AppResult<UsageLimits> {
        self.get_limits_at(subject, Utc::now()).await
    }

    pub async fn get_limits_at(
        &self,
        subject: &QuotaSubject,
        now: DateTime<Utc>,
    ) -> AppResult<UsageLimits> {
        let quota = self.current(subject, now).await?;
        Ok(UsageLimits::from(&quota))
    }

    /// Consumes one unit; `false` means the limit is reached and nothing changed
    ///
    /// Callers run this before the work it guards.
    pub async fn increment(&self, subject: &QuotaSubject) -> AppResult<bool> {
        self.increment_at(subject, Utc::now()).await
    }

    pub async fn increment_at(&self, subject: &QuotaSubject, now: DateTime<Utc>) -> AppResult<bool> {
        let quota = self.current(subject, now).await?;
        if !quota.has_capacity() {
            tracing::info!(
                subject = %subject,
                consumed = quota.consumed,
                daily_limit = quota.daily_limit,
                "Usage quota exhausted"
            );
            return Ok(false);
        }

        match self.store.increment_with_ceiling(&quota.subject).await? {
            Some(updated) => {
                tracing::debug!(
                    subject = %subject,
                    consumed = updated.consumed,
                    privileged = updated.is_privileged,
                    "Usage quota incremented"
                );
                Ok(true)
            }
            // Lost a race against another tab for the last unit
            None => {
                tracing::info!(subject = %subject, "Usage quota exhausted concurrently");
                Ok(false)
            }
        }
    }

    /// Loads the subject's row, creating it lazily and rolling it over when due
    async fn current(&self, subject: &QuotaSubject, now: DateTime<Utc>) -> AppResult<UsageQuota> {
        let seed = self.policy.seed(subject, now)?;
        let quota = self.store.load_or_create(&seed).await?;

        if now < quota.reset_at {
            return Ok(quota);
        }

        let rolled = self
            .store
            .roll_over(&quota.subject, now, next_reset_after(now)?)
            .await?;
        tracing::info!(
            subject = %subject,
            reset_at = %rolled.reset_at,
            "Usage quota rolled over"
        );
        Ok(rolled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryQuotaStore;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, 30, 0).unwrap()
    }

    fn governor(store: Arc<MemoryQuotaStore>) -> QuotaGovernor {
        QuotaGovernor::new(
            store,
            QuotaPolicy {
                anonymous_daily_limit: 3,
                user_daily_limit: 5,
                privileged_users: HashSet::from(["admin".to_string()]),
            },
        )
    }

    fn user(id: &str) -> QuotaSubject {
        QuotaSubject::User(id.to_string())
    }

    #[test]
    fn test_next_reset_is_following_midnight() {
        assert_eq!(
            next_reset_after(at(10)).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()
        );
        let midnight = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_reset_after(midnight).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 16, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_first_observation_creates_row() {
        let governor = governor(Arc::new(MemoryQuotaStore::new()));
        let limits = governor
            .get_limits_at(&QuotaSubject::Anonymous("tab".to_string()), at(9))
            .await
            .unwrap();

        assert_eq!(limits.daily_limit, Some(3));
        assert_eq!(limits.consumed, 0);
        assert_eq!(limits.remaining, Some(3));
        assert!(!limits.is_privileged);
    }

    #[tokio::test]
    async fn test_limit_reached_refuses_without_mutation() {
        let store = Arc::new(MemoryQuotaStore::new());
        store
            .put(UsageQuota {
                subject: "user:u1".to_string(),
                daily_limit: 5,
                consumed: 5,
                reset_at: next_reset_after(at(9)).unwrap(),
                is_privileged: false,
            })
            .await;
        let governor = governor(store);

        assert!(!governor.increment_at(&user("u1"), at(9)).await.unwrap());
        let limits = governor.get_limits_at(&user("u1"), at(9)).await.unwrap();
        assert_eq!(limits.consumed, 5);
        assert_eq!(limits.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_rollover_resets_consumption() {
        let store = Arc::new(MemoryQuotaStore::new());
        let yesterday_reset = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        store
            .put(UsageQuota {
                subject: "user:u1".to_string(),
                daily_limit: 5,
                consumed: 5,
                reset_at: yesterday_reset,
                is_privileged: false,
            })
            .await;
        let governor = governor(store);

        assert!(governor.increment_at(&user("u1"), at(9)).await.unwrap());
        let limits = governor.get_limits_at(&user("u1"), at(9)).await.unwrap();
        assert_eq!(limits.consumed, 1);
        assert_eq!(limits.reset_at, next_reset_after(at(9)).unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_limit_reached_refuses_without_mutation() {
        let store = Arc::new(MemoryQuotaStore::new());
        let subject = QuotaSubject::Anonymous("tab-7".to_string());
        store
            .put(UsageQuota {
                subject: subject.to_string(),
                daily_limit: 5,
                consumed: 5,
                reset_at: next_reset_after(at(9)).unwrap(),
                is_privileged: false,
            })
            .await;
        let governor = governor(store);

        assert!(!governor.increment_at(&subject, at(9)).await.unwrap());
        let limits = governor.get_limits_at(&subject, at(9)).await.unwrap();
        assert_eq!(limits.daily_limit, Some(5));
        assert_eq!(limits.consumed, 5);
        assert_eq!(limits.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_overdue_reset_rolls_over_on_read() {
        let store = Arc::new(MemoryQuotaStore::new());
        let yesterday_reset = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        store
            .put(UsageQuota {
                subject: "user:u3".to_string(),
                daily_limit: 5,
                consumed: 4,
                reset_at: yesterday_reset,
                is_privileged: false,
            })
            .await;
        let governor = governor(store);

        let limits = governor.get_limits_at(&user("u3"), at(9)).await.unwrap();
        assert_eq!(limits.consumed, 0);
        assert_eq!(limits.remaining, Some(5));
        assert_eq!(limits.reset_at, next_reset_after(at(9)).unwrap());
        assert!(limits.reset_at > at(9));
    }

    #[tokio::test]
    async fn test_privilege_follows_policy_for_existing_rows() {
        let store = Arc::new(MemoryQuotaStore::new());
        let reset_at = next_reset_after(at(9)).unwrap();
        store
            .put(UsageQuota {
                subject: "user:admin".to_string(),
                daily_limit: 5,
                consumed: 5,
                reset_at,
                is_privileged: false,
            })
            .await;
        store
            .put(UsageQuota {
                subject: "user:former".to_string(),
                daily_limit: 5,
                consumed: 5,
                reset_at,
                is_privileged: true,
            })
            .await;
        let governor = governor(store);

        assert!(governor.increment_at(&user("admin"), at(9)).await.unwrap());
        assert!(!governor.increment_at(&user("former"), at(9)).await.unwrap());

        let limits = governor.get_limits_at(&user("former"), at(9)).await.unwrap();
        assert!(!limits.is_privileged);
        assert_eq!(limits.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_privileged_always_succeeds() {
        let governor = governor(Arc::new(MemoryQuotaStore::new()));
        for _ in 0..20 {
            assert!(governor.increment_at(&user("admin"), at(9)).await.unwrap());
        }

        let limits = governor.get_limits_at(&user("admin"), at(9)).await.unwrap();
        assert!(limits.is_privileged);
        assert_eq!(limits.daily_limit, None);
        assert_eq!(limits.remaining, None);
    }

    #[tokio::test]
    async fn test_consumed_never_exceeds_limit() {
        let governor = governor(Arc::new(MemoryQuotaStore::new()));
        let subject = user("u2");

        let mut granted = 0;
        for _ in 0..12 {
            if governor.increment_at(&subject, at(9)).await.unwrap() {
                granted += 1;
            }
            let limits = governor.get_limits_at(&subject, at(9)).await.unwrap();
            assert!(limits.consumed <= 5);
        }
        assert_eq!(granted, 5);
    }

    #[tokio::test]
    async fn test_concurrent_increments_respect_ceiling() {
        let governor = governor(Arc::new(MemoryQuotaStore::new()));
        let subject = QuotaSubject::Anonymous("shared".to_string());

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let governor = governor.clone();
                let subject = subject.clone();
                tokio::spawn(async move { governor.increment_at(&subject, at(9)).await })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        let limits = governor.get_limits_at(&subject, at(9)).await.unwrap();
        assert_eq!(limits.consumed, 3);
    }
}
