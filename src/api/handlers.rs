use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::SessionId,
    models::{Caller, DiscoveryFilters, DiscoveryPage, Mood, UsageLimits},
    services::{submit_query, AssistantOutcome, LimitReachedResponse},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct SelectMoodRequest {
    pub mood: String,
    pub filters: Option<DiscoveryFilters>,
    #[serde(default)]
    pub retry: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyFiltersRequest {
    pub filters: DiscoveryFilters,
    #[serde(default)]
    pub retry: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadMoreRequest {
    #[serde(default)]
    pub retry: u32,
}

#[derive(Debug, Deserialize)]
pub struct AssistantQueryRequest {
    pub query: String,
    #[serde(default)]
    pub retry: u32,
}

#[derive(Debug, Serialize)]
pub struct AssistantResponse {
    pub allowed: bool,
    pub mood: Mood,
    #[serde(flatten)]
    pub page: DiscoveryPage,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Fresh discovery for a mood, optionally replacing the filters
pub async fn select_mood(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<SelectMoodRequest>,
) -> AppResult<Json<DiscoveryPage>> {
    let mood: Mood = request.mood.parse()?;

    let mut session = state.sessions.begin(session_id).await;
    session.retry = request.retry;
    tracing::info!(
        session_id = %session_id,
        mood = %mood,
        generation = session.generation,
        retry = request.retry,
        "Mood selected"
    );

    let session = state
        .engine
        .select_mood(session, mood, request.filters, &caller)
        .await?;
    let session = state.sessions.commit(session_id, session).await?;

    Ok(Json(session.page()))
}

/// Re-runs discovery for the current mood with new filters
pub async fn apply_filters(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<ApplyFiltersRequest>,
) -> AppResult<Json<DiscoveryPage>> {
    let mut session = state.sessions.begin(session_id).await;
    session.retry = request.retry;
    tracing::info!(
        session_id = %session_id,
        generation = session.generation,
        retry = request.retry,
        "Filters applied"
    );

    let session = state
        .engine
        .apply_filters(session, request.filters, &caller)
        .await?;
    let session = state.sessions.commit(session_id, session).await?;

    Ok(Json(session.page()))
}

/// Reveals the next window of the current session
pub async fn load_more(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    request: Option<Json<LoadMoreRequest>>,
) -> AppResult<Json<DiscoveryPage>> {
    let Json(request) = request.unwrap_or_default();

    let mut session = state.sessions.begin(session_id).await;
    session.retry = request.retry;

    let session = state.engine.load_more(session, &caller).await?;
    let session = state.sessions.commit(session_id, session).await?;

    Ok(Json(session.page()))
}

/// Usage limits for the calling subject
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<UsageLimits>> {
    let limits = state.governor.get_limits(&caller.subject()).await?;
    Ok(Json(limits))
}

/// Quota-gated free-form discovery
pub async fn assistant_query(
    State(state): State<AppState>,
    Extension(session_id): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<AssistantQueryRequest>,
) -> AppResult<Response> {
    let mut session = state.sessions.begin(session_id).await;
    session.retry = request.retry;

    let outcome = submit_query(
        &state.governor,
        &state.engine,
        session,
        &caller,
        &request.query,
    )
    .await?;

    match outcome {
        AssistantOutcome::LimitReached(limits) => Ok(Json(LimitReachedResponse {
            allowed: false,
            limits,
        })
        .into_response()),
        AssistantOutcome::Discovered { mood, session } => {
            let session = state.sessions.commit(session_id, session).await?;
            Ok(Json(AssistantResponse {
                allowed: true,
                mood,
                page: session.page(),
            })
            .into_response())
        }
    }
}
