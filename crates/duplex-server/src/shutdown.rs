//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use duplex_ws::Hub;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bound on closing all sessions at shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across the listener and all sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then close every session in `hub`, giving up after
    /// `timeout`.
    pub async fn graceful_shutdown(&self, hub: &Hub, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            sessions = hub.len(),
            timeout_secs = timeout.as_secs(),
            "closing sessions"
        );

        match tokio::time::timeout(timeout, hub.close_all()).await {
            Ok(0) => info!("all sessions closed"),
            Ok(failed) => warn!(failed, "sessions closed with errors"),
            Err(_) => warn!("shutdown timed out after {timeout:?}, some sessions may still be open"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use duplex_core::settings::ConnectionSettings;
    use duplex_ws::Connection;
    use duplex_ws::testing::{MockTransport, PeerBehavior};

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_sessions() {
        let coord = ShutdownCoordinator::new();
        let hub = Arc::new(Hub::new());
        let (transport, _peer) = MockTransport::new(PeerBehavior::EchoClose);
        let conn = Connection::open("s".into(), transport.clone(), &hub, &ConnectionSettings::default());
        let _ = hub.register(conn);

        coord.graceful_shutdown(&hub, None).await;
        assert!(coord.is_shutting_down());
        assert!(hub.is_empty());
        assert_eq!(transport.write_close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_is_bounded() {
        let coord = ShutdownCoordinator::new();
        let hub = Arc::new(Hub::new());
        let (transport, _peer) = MockTransport::new(PeerBehavior::Silent);
        let conn = Connection::open("s".into(), transport, &hub, &ConnectionSettings::default());
        let _ = hub.register(conn);

        let start = tokio::time::Instant::now();
        coord
            .graceful_shutdown(&hub, Some(Duration::from_millis(100)))
            .await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }
}
