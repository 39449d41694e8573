//! Transport and connection error types.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`Transport`](crate::Transport).
///
/// `Clone` so the outcome of the single close-control attempt can be cached
/// and replayed to every caller of `close`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// A close frame was already written on this socket, either by us or
    /// automatically in reply to the peer's close frame.
    #[error("close frame already sent")]
    CloseSent,
    /// The stream ended cleanly (close handshake finished or socket torn down).
    #[error("connection closed")]
    Closed,
    /// The per-call deadline passed before the write completed.
    #[error("write deadline exceeded")]
    DeadlineExceeded,
    /// Network level failure (reset, broken pipe, ...).
    #[error("transport I/O error: {0}")]
    Io(String),
    /// The peer violated the WebSocket protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Build an I/O error from any displayable cause.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Build a protocol error from any displayable cause.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether this error marks the normal end of the inbound stream.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors surfaced by [`Connection`](crate::Connection) operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// `send` was called after `close` began; the request was not queued.
    #[error("connection is closing, send rejected")]
    Closing,
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The outbound message could not be serialized to JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    /// The peer did not finish the close handshake in time and the socket
    /// was torn down.
    #[error("peer did not complete close within {0:?}")]
    CloseTimeout(Duration),
}

impl ConnError {
    /// The transport error behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::CloseSent.to_string(), "close frame already sent");
        assert_eq!(
            TransportError::io("connection reset by peer").to_string(),
            "transport I/O error: connection reset by peer"
        );
    }

    #[test]
    fn only_closed_is_clean() {
        assert!(TransportError::Closed.is_clean_close());
        assert!(!TransportError::io("reset").is_clean_close());
        assert!(!TransportError::CloseSent.is_clean_close());
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(ref m) if m.contains("reset")));
    }

    #[test]
    fn conn_error_is_transparent_over_transport() {
        let err: ConnError = TransportError::DeadlineExceeded.into();
        assert_eq!(err.to_string(), "write deadline exceeded");
        assert_eq!(err.transport(), Some(&TransportError::DeadlineExceeded));
    }

    #[test]
    fn closing_has_no_transport_cause() {
        assert!(ConnError::Closing.transport().is_none());
    }

    #[test]
    fn close_timeout_mentions_duration() {
        let err = ConnError::CloseTimeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
