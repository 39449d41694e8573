//! Metric names recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding binary installs a recorder.

/// Connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections closed total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Close handshakes that hit the deadline (counter).
pub const WS_CLOSE_TIMEOUTS_TOTAL: &str = "ws_close_timeouts_total";
/// Outbound writes that failed (counter).
pub const WS_SEND_ERRORS_TOTAL: &str = "ws_send_errors_total";
/// Inbound payloads dropped while closing (counter).
pub const WS_INBOUND_DROPS_TOTAL: &str = "ws_inbound_drops_total";
/// Sessions registered in a hub (gauge).
pub const HUB_SESSIONS: &str = "hub_sessions";
