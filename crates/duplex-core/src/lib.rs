//! # duplex-core
//!
//! Shared vocabulary for the duplex crates:
//!
//! - **Session IDs**: [`SessionId`] newtype used as the hub key
//! - **Settings**: [`settings::DuplexSettings`] with file + env layering
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod settings;

pub use ids::SessionId;
