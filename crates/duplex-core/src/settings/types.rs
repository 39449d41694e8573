//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files deserialize with defaults for missing fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{Result, SettingsError};

/// Smallest accepted timeout, in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 10;
/// Largest accepted timeout, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Root settings type.
///
/// ```json
/// {
///   "logLevel": "debug",
///   "server": { "port": 9090 },
///   "connection": { "closeRecvTimeoutMs": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplexSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Per-connection queue and deadline settings.
    pub connection: ConnectionSettings,
}

impl Default for DuplexSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerSettings::default(),
            connection: ConnectionSettings::default(),
        }
    }
}

impl DuplexSettings {
    /// Reject values that would make a connection unusable.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port to bind (`0` = auto-assign).
    pub port: u16,
    /// Maximum concurrently registered sessions.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9850,
            max_connections: 1024,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Connection timing and backpressure settings.
///
/// These are fixed for the lifetime of a connection; individual `send`
/// and `close` calls cannot override them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Write deadline for each outbound message and for the close frame.
    pub send_timeout_ms: u64,
    /// How long `close` waits for the peer to finish the close handshake.
    pub close_recv_timeout_ms: u64,
    /// Deadline for answering the HTTP upgrade request on `/ws`. The upgraded
    /// socket is handed over after the response, outside this bound.
    pub handshake_timeout_ms: u64,
    /// Capacity of the outbound request queue.
    pub outbound_capacity: usize,
    /// Capacity of the inbound message queue.
    pub inbound_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            close_recv_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            outbound_capacity: 10,
            inbound_capacity: 10,
        }
    }
}

impl ConnectionSettings {
    /// Write deadline as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Close wait as a [`Duration`].
    pub fn close_recv_timeout(&self) -> Duration {
        Duration::from_millis(self.close_recv_timeout_ms)
    }

    /// Handshake deadline as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Timeouts must lie in [`MIN_TIMEOUT_MS`]..=[`MAX_TIMEOUT_MS`] and queue
    /// capacities must be non-zero (`tokio::sync::mpsc` panics otherwise).
    pub fn validate(&self) -> Result<()> {
        for (name, ms) in [
            ("sendTimeoutMs", self.send_timeout_ms),
            ("closeRecvTimeoutMs", self.close_recv_timeout_ms),
            ("handshakeTimeoutMs", self.handshake_timeout_ms),
        ] {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) {
                return Err(SettingsError::InvalidValue(format!(
                    "connection.{name} must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms, got {ms}"
                )));
            }
        }
        if self.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.outboundCapacity must be > 0".into(),
            ));
        }
        if self.inbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.inboundCapacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}
