//! Registry of live connections keyed by session ID.

use std::collections::HashMap;
use std::sync::Arc;

use duplex_core::SessionId;
use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::metrics::HUB_SESSIONS;

/// Maps session IDs to their [`Connection`]. All operations are serialized
/// through one mutex and never await while holding it.
#[derive(Default)]
pub struct Hub {
    conns: Mutex<HashMap<SessionId, Arc<Connection>>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under its ID, replacing any existing entry.
    ///
    /// Returns the displaced connection so the caller can close it.
    pub fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let id = conn.id().clone();
        let mut conns = self.conns.lock();
        let previous = conns.insert(id.clone(), conn);
        gauge!(HUB_SESSIONS).set(conns.len() as f64);
        drop(conns);

        if previous.is_some() {
            warn!(session_id = %id, "session re-registered, previous connection displaced");
        } else {
            debug!(session_id = %id, "session registered");
        }
        previous
    }

    /// Remove `conn`, but only if it is still the one registered under its
    /// ID. A connection displaced by a re-registration cannot evict its
    /// replacement.
    pub fn unregister(&self, conn: &Connection) -> bool {
        let mut conns = self.conns.lock();
        let current = conns
            .get(conn.id().as_str())
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), conn));
        if current {
            let _ = conns.remove(conn.id().as_str());
            gauge!(HUB_SESSIONS).set(conns.len() as f64);
            debug!(session_id = %conn.id(), "session unregistered");
        }
        current
    }

    /// Remove whatever is registered under `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        let mut conns = self.conns.lock();
        let removed = conns.remove(id);
        gauge!(HUB_SESSIONS).set(conns.len() as f64);
        removed
    }

    /// Connection registered under `id`, if any.
    pub fn lookup(&self, id: &str) -> Option<Arc<Connection>> {
        self.conns.lock().get(id).cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.conns.lock().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.conns.lock().is_empty()
    }

    /// IDs of all registered sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        self.conns.lock().keys().cloned().collect()
    }

    /// Snapshot of all registered connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.conns.lock().values().cloned().collect()
    }

    /// Unregister every session and close them concurrently.
    ///
    /// Returns how many closes reported an error.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut conns = self.conns.lock();
            let drained = conns.drain().map(|(_, c)| c).collect();
            gauge!(HUB_SESSIONS).set(0.0);
            drained
        };
        let results = futures::future::join_all(drained.iter().map(|c| c.close())).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = drained.len(), "some sessions did not close cleanly");
        }
        failed
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("sessions", &self.len()).finish()
    }
}
