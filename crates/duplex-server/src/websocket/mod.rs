//! WebSocket sessions: the axum socket adapter and the per-client loop.

pub mod session;
pub mod transport;

pub use transport::AxumTransport;
