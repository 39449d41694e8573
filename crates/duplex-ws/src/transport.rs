//! Socket capability consumed by [`Connection`](crate::Connection).
//!
//! The upgrade handshake and the frame codec live in the socket library;
//! this trait is the narrow surface the connection needs from it.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::TransportError;

/// One inbound message as seen by the reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
    /// The peer's close frame.
    Close,
}

impl Frame {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Close => "close",
        }
    }
}

/// A live, full-duplex socket.
///
/// Implementations must tolerate one concurrent reader alongside writers
/// (`write_text` and `write_close` may race and must be serialized
/// internally).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one text message, failing with
    /// [`TransportError::DeadlineExceeded`] if not done by `deadline`.
    async fn write_text(&self, payload: String, deadline: Instant) -> Result<(), TransportError>;

    /// Write the close control frame.
    ///
    /// Returns [`TransportError::CloseSent`] if a close frame already went
    /// out, including one sent automatically in reply to the peer's close.
    async fn write_close(&self, deadline: Instant) -> Result<(), TransportError>;

    /// Wait for the next message. After the first error no further data is
    /// returned.
    async fn read_message(&self) -> Result<Frame, TransportError>;

    /// Tear the socket down without waiting for the peer. Pending and
    /// future reads fail promptly afterwards.
    async fn close(&self) -> Result<(), TransportError>;
}
