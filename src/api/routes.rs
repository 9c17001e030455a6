use axum::{
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_session_id, session_middleware, session::SESSION_ID_HEADER};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    // Browsers only see the echoed session id if it is exposed
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)]);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Discovery
        .route("/discover/mood", post(handlers::select_mood))
        .route("/discover/filters", post(handlers::apply_filters))
        .route("/discover/more", post(handlers::load_more))
        // Quota-gated assistant
        .route("/usage", get(handlers::get_usage))
        .route("/assistant/query", post(handlers::assistant_query))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn(session_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_session_id)),
        )
        .with_state(state)
}
