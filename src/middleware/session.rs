use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::Caller;

/// HTTP header carrying the discovery session id
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Header set by the upstream gateway for authenticated users
pub const USER_ID_HEADER: &str = "x-user-id";

/// Discovery session id stored in request extensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves the session id and the caller, then echoes the session id back
///
/// An `x-session-id` that is missing or not a UUID gets a fresh v4 id. A
/// non-empty `x-user-id` makes the caller authenticated; otherwise the caller
/// is anonymous and metered by session id.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let session_id = request
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(SessionId)
        .unwrap_or_else(SessionId::new);

    let caller = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| Caller::Authenticated {
            user_id: id.to_string(),
        })
        .unwrap_or_else(|| Caller::Anonymous {
            session_token: session_id.as_str(),
        });

    request.extensions_mut().insert(session_id);
    request.extensions_mut().insert(caller);

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&session_id.as_str()) {
        response
            .headers_mut()
            .insert(SESSION_ID_HEADER, header_value);
    }

    response
}

/// Tracing span carrying the session id; the trace layer runs inside the session layer
pub fn make_span_with_session_id(request: &Request<Body>) -> tracing::Span {
    let session_id = request
        .extensions()
        .get::<SessionId>()
        .map(|id| id.as_str())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        session_id = %session_id,
    )
}
