//! # duplex-ws
//!
//! Lifecycle of a full-duplex WebSocket session over an already-upgraded
//! socket, plus a hub that looks up live sessions by ID.
//!
//! - [`Transport`]: capability trait the socket library must provide
//! - [`Connection`]: one send worker, one receive worker, bounded queues,
//!   and a deadline-bounded close handshake
//! - [`Hub`]: `SessionId` → `Connection` registry behind one mutex
//! - [`testing::MockTransport`]: in-memory scripted peer for tests

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod hub;
pub mod metrics;
pub mod testing;
pub mod transport;

pub use connection::{Connection, ConnectionState};
pub use errors::{ConnError, TransportError};
pub use hub::Hub;
pub use transport::{Frame, Transport};
