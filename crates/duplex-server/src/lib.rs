//! # duplex-server
//!
//! Axum HTTP + `WebSocket` server hosting duplex sessions.
//!
//! - `/ws` upgrades into a [`duplex_ws::Connection`] registered in a shared hub
//! - `/sessions/{id}/messages` pushes a JSON message into a live session
//! - `/health` reports uptime and the live session count
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::ServerError;
pub use server::DuplexServer;
