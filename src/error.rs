use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Every page of every requested content type failed
    #[error("All {failed_pages} catalog page fetches failed")]
    AggregateFetch { failed_pages: usize },

    /// Every fallback attempt finished without a single item
    #[error("No content found for the current selection")]
    NoContentFound,

    #[error("Catalog service rate limited the request")]
    UpstreamRateLimited,

    #[error("Catalog credentials rejected: {0}")]
    AuthExpired(String),

    /// Only ever logged by the cache layer
    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    #[error("Unknown mood: {0}")]
    UnknownMood(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    /// A newer request for the same session finished or started first
    #[error("Request superseded by generation {current}")]
    Superseded { current: u64 },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable snake_case identifier exposed to clients
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Cache(_) => "cache",
            AppError::HttpClient(_) => "http_client",
            AppError::AggregateFetch { .. } => "aggregate_fetch",
            AppError::NoContentFound => "no_content_found",
            AppError::UpstreamRateLimited => "upstream_rate_limited",
            AppError::AuthExpired(_) => "auth_expired",
            AppError::CacheWrite(_) => "cache_write",
            AppError::UnknownMood(_) => "unknown_mood",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ExternalApi(_) => "external_api",
            AppError::Superseded { .. } => "superseded",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether the user can usefully retry the same action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NoContentFound
                | AppError::UpstreamRateLimited
                | AppError::AggregateFetch { .. }
                | AppError::ExternalApi(_)
                | AppError::HttpClient(_)
                | AppError::Superseded { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NoContentFound => StatusCode::NOT_FOUND,
            AppError::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::AuthExpired(_) => StatusCode::UNAUTHORIZED,
            AppError::UnknownMood(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Superseded { .. } => StatusCode::CONFLICT,
            AppError::AggregateFetch { .. } | AppError::ExternalApi(_) | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::CacheWrite(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
