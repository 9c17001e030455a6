use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{Caller, DiscoverySession, Mood, UsageLimits},
    services::{discovery::DiscoveryEngine, quota::QuotaGovernor},
};

/// Result of a quota-gated assistant query
#[derive(Debug)]
pub enum AssistantOutcome {
    /// Quota refused; nothing was fetched
    LimitReached(UsageLimits),
    Discovered { mood: Mood, session: DiscoverySession },
}

/// Body returned when the caller is out of assistant queries
#[derive(Debug, Serialize)]
pub struct LimitReachedResponse {
    pub allowed: bool,
    pub limits: UsageLimits,
}

/// Resolves a free-form query to a mood and runs discovery for it
///
/// The quota unit is consumed before any catalog work. Empty or unmatched
/// queries are rejected first and do not consume quota.
pub async fn submit_query(
    governor: &QuotaGovernor,
    engine: &DiscoveryEngine,
    session: DiscoverySession,
    caller: &Caller,
    query: &str,
) -> AppResult<AssistantOutcome> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("Query must not be empty".to_string()));
    }

    let mood = Mood::infer(query).ok_or_else(|| AppError::UnknownMood(query.to_string()))?;

    let subject = caller.subject();
    if !governor.increment(&subject).await? {
        let limits = governor.get_limits(&subject).await?;
        return Ok(AssistantOutcome::LimitReached(limits));
    }

    tracing::info!(subject = %subject, mood = %mood, "Assistant query accepted");

    let session = engine.select_mood(session, mood, None, caller).await?;
    Ok(AssistantOutcome::Discovered { mood, session })
}
