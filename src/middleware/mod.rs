pub mod session;

pub use session::{make_span_with_session_id, session_middleware, SessionId};
