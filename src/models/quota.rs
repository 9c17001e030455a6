use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity against which daily usage is metered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum QuotaSubject {
    /// Authenticated user id
    User(String),
    /// Anonymous session token
    Anonymous(String),
}

impl Display for QuotaSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaSubject::User(id) => write!(f, "user:{}", id),
            QuotaSubject::Anonymous(token) => write!(f, "anon:{}", token),
        }
    }
}

/// Who is calling the discovery pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Authenticated { user_id: String },
    Anonymous { session_token: String },
}

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Caller::Authenticated { user_id } => Some(user_id),
            Caller::Anonymous { .. } => None,
        }
    }

    pub fn subject(&self) -> QuotaSubject {
        match self {
            Caller::Authenticated { user_id } => QuotaSubject::User(user_id.clone()),
            Caller::Anonymous { session_token } => QuotaSubject::Anonymous(session_token.clone()),
        }
    }
}

/// Stored daily quota row for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageQuota {
    /// Rendered `QuotaSubject`
    pub subject: String,
    pub daily_limit: u32,
    pub consumed: u32,
    /// Next rollover instant
    pub reset_at: DateTime<Utc>,
    pub is_privileged: bool,
}

impl UsageQuota {
    pub fn has_capacity(&self) -> bool {
        self.is_privileged || self.consumed < self.daily_limit
    }
}

/// Display contract for usage limits; privileged subjects show as unlimited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageLimits {
    pub daily_limit: Option<u32>,
    pub consumed: u32,
    pub remaining: Option<u32>,
    pub reset_at: DateTime<Utc>,
    pub is_privileged: bool,
}

impl From<&UsageQuota> for UsageLimits {
    fn from(quota: &UsageQuota) -> Self {
        if quota.is_privileged {
            return Self {
                daily_limit: None,
                consumed: quota.consumed,
                remaining: None,
                reset_at: quota.reset_at,
                is_privileged: true,
            };
        }

        Self {
            daily_limit: Some(quota.daily_limit),
            consumed: quota.consumed,
            remaining: Some(quota.daily_limit.saturating_sub(quota.consumed)),
            reset_at: quota.reset_at,
            is_privileged: false,
        }
    }
}
