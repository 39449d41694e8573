//! HTTP-facing server errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use duplex_ws::ConnError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the server's handlers and startup.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No live session is registered under the given ID.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// The hub is at `max_connections`.
    #[error("connection limit reached ({0})")]
    AtCapacity(usize),
    /// Delivering a message to the session failed.
    #[error("delivery failed: {0}")]
    Send(#[from] ConnError),
    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AtCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Send(ConnError::Closing) => StatusCode::GONE,
            Self::Send(ConnError::Encode(_)) => StatusCode::BAD_REQUEST,
            Self::Send(_) => StatusCode::BAD_GATEWAY,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_ws::TransportError;

    #[test]
    fn not_found_is_404() {
        let err = ServerError::SessionNotFound("x".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "session not found: x");
    }

    #[test]
    fn capacity_is_503() {
        assert_eq!(ServerError::AtCapacity(1).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn send_errors_map_by_cause() {
        assert_eq!(ServerError::Send(ConnError::Closing).status(), StatusCode::GONE);
        let err = ServerError::from(ConnError::from(TransportError::DeadlineExceeded));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn response_body_carries_message() {
        let resp = ServerError::SessionNotFound("abc".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "session not found: abc");
    }
}
