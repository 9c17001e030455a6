use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::{sync::RwLock, time::Instant};

use crate::{
    error::{AppError, AppResult},
    middleware::SessionId,
    models::DiscoverySession,
    services::{DiscoveryEngine, QuotaGovernor},
};

/// Sessions untouched for this long are dropped
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DiscoveryEngine>,
    pub governor: QuotaGovernor,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(engine: DiscoveryEngine, governor: QuotaGovernor) -> Self {
        Self {
            engine: Arc::new(engine),
            governor,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn with_session_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.sessions = SessionRegistry::new(idle_ttl);
        self
    }
}

struct SessionEntry {
    session: DiscoverySession,
    touched: Instant,
}

/// Discovery sessions keyed by session id, guarded by per-session generations
///
/// `begin` stamps a request with a new generation; `commit` only stores a
/// result whose generation is still the newest one started for that session.
/// Sessions idle for longer than `idle_ttl` are evicted on the next `begin`.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    idle_ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TTL)
    }
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Starts a request: bumps the generation and returns the session to work on
    pub async fn begin(&self, id: SessionId) -> DiscoverySession {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;

        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.touched) < self.idle_ttl);
        if sessions.len() < before {
            tracing::debug!(evicted = before - sessions.len(), "Evicted idle discovery sessions");
        }

        let entry = sessions.entry(id).or_insert_with(|| SessionEntry {
            session: DiscoverySession::default(),
            touched: now,
        });
        entry.touched = now;
        entry.session.generation += 1;
        entry.session.clone()
    }

    /// Stores a finished session unless a newer request has started since
    pub async fn commit(&self, id: SessionId, session: DiscoverySession) -> AppResult<DiscoverySession> {
        let mut sessions = self.inner.write().await;
        let current = sessions.get(&id).map_or(0, |e| e.session.generation);

        if session.generation != current {
            tracing::info!(
                session_id = %id,
                generation = session.generation,
                current,
                "Discarding superseded discovery result"
            );
            return Err(AppError::Superseded { current });
        }

        sessions.insert(
            id,
            SessionEntry {
                session: session.clone(),
                touched: Instant::now(),
            },
        );
        Ok(session)
    }

    /// Current stored session, or an empty one
    pub async fn snapshot(&self, id: SessionId) -> DiscoverySession {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|e| e.session.clone())
            .unwrap_or_default()
    }

    /// Number of sessions currently held
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
