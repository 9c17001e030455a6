use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{DiscoveryFilters, Mood};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Hex SHA-256 of the canonical mood + filter rendering
    Discovery(String),
}

impl CacheKey {
    /// Content-addressed key for a discovery request; equal inputs give equal keys
    pub fn discovery(mood: Option<Mood>, filters: &DiscoveryFilters) -> Self {
        let platforms = filters
            .platforms
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let year = |y: Option<i32>| y.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
        // Shortest round-trip rendering; adding 0.0 folds -0.0 into 0.0
        let rating = filters.min_rating + 0.0;

        let canonical = format!(
            "mood={};type={};platforms={};rating={};from={};to={}",
            mood.map(|m| m.as_str()).unwrap_or("any"),
            filters.content_type,
            platforms,
            rating,
            year(filters.year_from),
            year(filters.year_to),
        );

        CacheKey::Discovery(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Discovery(digest) => write!(f, "discover:{}", digest),
        }
    }
}

/// Key-value store with TTL support backing the discovery cache
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl: u64) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Process-local backend; expiry is left to the `Cache` envelope check
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: String, _ttl: u64) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Stored envelope; the TTL is checked lazily on every read
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    key: String,
    payload: T,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        now.signed_duration_since(self.created_at) < ttl
    }
}

/// Best-effort cache: read failures are misses and write failures are logged
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Retrieves a fresh value, or `None` on miss, expiry or backend failure
    pub async fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.get_from_cache_at(key, Utc::now()).await
    }

    pub async fn get_from_cache_at<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let raw = match self.backend.get(&key.to_string()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, backend = self.backend.name(), "Cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache deserialization error, treating as miss");
                return None;
            }
        };

        if !entry.is_fresh(now) {
            tracing::debug!(key = %key, created_at = %entry.created_at, "Cache entry expired");
            return None;
        }

        tracing::debug!(key = %key, "Cache hit");
        Some(entry.payload)
    }

    /// Stores a value; failures never reach the caller
    pub async fn set_in_cache<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        self.set_in_cache_at(key, value, ttl, Utc::now()).await
    }

    pub async fn set_in_cache_at<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: u64,
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self.write(key, value, ttl, now).await {
            tracing::error!(error = %e, key = %key, backend = self.backend.name(), "Failed to write discovery cache");
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: u64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: value,
            created_at: now,
            ttl_secs: ttl,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::CacheWrite(format!("serialization: {}", e)))?;

        self.backend
            .set_ex(&entry.key, json, ttl)
            .await
            .map_err(|e| AppError::CacheWrite(e.to_string()))
    }
}
