//! A single full-duplex session over one [`Transport`].
//!
//! Every connection runs exactly two tasks for its whole life:
//!
//! - the **send worker** drains the bounded outbound queue, writing each
//!   request with a deadline and reporting the outcome to its caller;
//! - the **receive worker** reads frames, forwards text payloads into the
//!   bounded inbound queue, and closes that queue once reading fails.
//!
//! # Close protocol
//!
//! `Open → Closing → Closed`. Closing starts on [`Connection::close`] or on
//! the receive worker's terminal read error, whichever comes first; both
//! paths share one close-control attempt whose result is cached. `close`
//! then waits (bounded) for the receive worker, tears the socket down if
//! the peer never finished the handshake, and joins both workers before
//! returning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use duplex_core::SessionId;
use duplex_core::settings::ConnectionSettings;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::errors::{ConnError, TransportError};
use crate::hub::Hub;
use crate::metrics::{
    WS_CLOSE_TIMEOUTS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_INBOUND_DROPS_TOTAL, WS_SEND_ERRORS_TOTAL,
};
use crate::transport::{Frame, Transport};

/// Lifecycle state of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Both workers running; sends and receives possible.
    Open = 0,
    /// Close control frame sent (or being sent); waiting for the peer.
    Closing = 1,
    /// Receive side finished or the close wait timed out.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One pending outbound message and the slot its caller waits on.
struct SendRequest {
    payload: String,
    result: oneshot::Sender<Result<(), TransportError>>,
}

/// Item of the inbound queue.
enum Inbound {
    Message(String),
    Failed(TransportError),
}

/// Outcome of handing one item to the inbound queue.
enum Delivery {
    Queued,
    Dropped,
    Gone,
}

struct Workers {
    send: JoinHandle<()>,
    recv: JoinHandle<()>,
}

/// State shared with the worker tasks.
struct Shared {
    id: SessionId,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    close_result: OnceCell<Result<(), TransportError>>,
    state: AtomicU8,
}

impl Shared {
    fn advance(&self, to: ConnectionState) {
        let _ = self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    /// Write the close control frame at most once; every caller gets the
    /// cached outcome. `CloseSent` counts as success.
    async fn send_close(&self) -> Result<(), TransportError> {
        self.close_result
            .get_or_init(|| async {
                self.advance(ConnectionState::Closing);
                let deadline = Instant::now() + self.send_timeout;
                match self.transport.write_close(deadline).await {
                    Ok(()) => {
                        debug!(session_id = %self.id, "close frame sent");
                        Ok(())
                    }
                    Err(TransportError::CloseSent) => {
                        debug!(session_id = %self.id, "close frame already sent");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, error = %e, "failed to send close frame");
                        Err(e)
                    }
                }
            })
            .await
            .clone()
    }
}

/// A live session.
///
/// Construct with [`Connection::open`] (or [`Connection::standalone`]) from
/// inside a tokio runtime; both workers are spawned immediately.
pub struct Connection {
    id: SessionId,
    close_timeout: Duration,
    shared: Arc<Shared>,
    outbound: Mutex<Option<mpsc::Sender<SendRequest>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Inbound>>,
    closing: CancellationToken,
    recv_done: CancellationToken,
    workers: tokio::sync::Mutex<Option<Workers>>,
    data: Mutex<HashMap<String, String>>,
    hub: Weak<Hub>,
}

impl Connection {
    /// Wrap a live socket and start both workers. The connection remembers
    /// `hub` (weakly) but is not registered in it.
    pub fn open(
        id: SessionId,
        transport: Arc<dyn Transport>,
        hub: &Arc<Hub>,
        settings: &ConnectionSettings,
    ) -> Arc<Self> {
        Self::spawn(id, transport, Arc::downgrade(hub), settings)
    }

    /// Like [`Connection::open`] without a hub back-reference.
    pub fn standalone(
        id: SessionId,
        transport: Arc<dyn Transport>,
        settings: &ConnectionSettings,
    ) -> Arc<Self> {
        Self::spawn(id, transport, Weak::new(), settings)
    }

    fn spawn(
        id: SessionId,
        transport: Arc<dyn Transport>,
        hub: Weak<Hub>,
        settings: &ConnectionSettings,
    ) -> Arc<Self> {
        let (out_tx, out_rx) = mpsc::channel(settings.outbound_capacity.max(1));
        let (in_tx, in_rx) = mpsc::channel(settings.inbound_capacity.max(1));
        let closing = CancellationToken::new();
        let recv_done = CancellationToken::new();

        let shared = Arc::new(Shared {
            id: id.clone(),
            transport,
            send_timeout: settings.send_timeout(),
            close_result: OnceCell::new(),
            state: AtomicU8::new(ConnectionState::Open as u8),
        });

        let send = tokio::spawn(run_send_worker(shared.clone(), out_rx));
        let recv = tokio::spawn(run_recv_worker(
            shared.clone(),
            in_tx,
            closing.clone(),
            recv_done.clone(),
        ));

        info!(session_id = %id, "connection opened");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        Arc::new(Self {
            id,
            close_timeout: settings.close_recv_timeout(),
            shared,
            outbound: Mutex::new(Some(out_tx)),
            inbound: tokio::sync::Mutex::new(in_rx),
            closing,
            recv_done,
            workers: tokio::sync::Mutex::new(Some(Workers { send, recv })),
            data: Mutex::new(HashMap::new()),
            hub,
        })
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// The hub this connection was opened for, if it is still alive.
    pub fn hub(&self) -> Option<Arc<Hub>> {
        self.hub.upgrade()
    }

    /// Serialize `msg` as JSON and send it, waiting for the write result.
    ///
    /// Waits while the outbound queue is full. Fails with
    /// [`ConnError::Closing`] once [`close`](Self::close) has begun.
    pub async fn send<T: Serialize + ?Sized>(&self, msg: &T) -> Result<(), ConnError> {
        let payload = serde_json::to_string(msg)?;
        self.send_text(payload).await
    }

    /// Send an already-encoded text payload.
    #[instrument(skip_all, fields(session_id = %self.id, len = payload.len()))]
    pub async fn send_text(&self, payload: String) -> Result<(), ConnError> {
        let tx = self.outbound.lock().clone().ok_or(ConnError::Closing)?;
        let (result_tx, result_rx) = oneshot::channel();
        tx.send(SendRequest {
            payload,
            result: result_tx,
        })
        .await
        .map_err(|_| ConnError::Closing)?;
        drop(tx);

        match result_rx.await {
            Ok(result) => result.map_err(ConnError::from),
            // worker aborted during teardown
            Err(_) => Err(ConnError::Closing),
        }
    }

    /// Next inbound text payload.
    ///
    /// `Ok(None)` is end of stream. The read error that ended the stream is
    /// returned once (unless it was a clean close), then `Ok(None)` forever.
    /// Once [`close`](Self::close) has begun, anything that does not fit in
    /// the inbound queue is dropped, the terminal read error included.
    pub async fn recv(&self) -> Result<Option<String>, ConnError> {
        let mut rx = self.inbound.lock().await;
        match rx.recv().await {
            Some(Inbound::Message(text)) => Ok(Some(text)),
            Some(Inbound::Failed(err)) => Err(ConnError::Transport(err)),
            None => Ok(None),
        }
    }

    /// Close the session.
    ///
    /// Stops accepting sends, sends the close frame (once per connection),
    /// waits up to the configured close timeout for the peer, tears the
    /// socket down if it had to give up, and joins both workers.
    ///
    /// Returns the close-frame error or the teardown error, whichever came
    /// first; a timeout whose teardown succeeded is
    /// [`ConnError::CloseTimeout`]. Calling again is harmless: the close
    /// frame is not resent and the cached close-frame outcome is returned.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn close(&self) -> Result<(), ConnError> {
        if self.outbound.lock().take().is_some() {
            debug!("outbound queue closed");
        }
        self.closing.cancel();

        let result = match self.shared.send_close().await {
            Err(e) => {
                // no close reply can follow a close frame that never went out
                if let Err(teardown) = self.shared.transport.close().await {
                    debug!(error = %teardown, "teardown after failed close frame");
                }
                Err(ConnError::Transport(e))
            }
            Ok(()) => {
                if tokio::time::timeout(self.close_timeout, self.recv_done.cancelled())
                    .await
                    .is_ok()
                {
                    if let Err(e) = self.shared.transport.close().await {
                        debug!(error = %e, "release after close handshake");
                    }
                    Ok(())
                } else {
                    warn!(timeout = ?self.close_timeout, "peer did not finish close, tearing down");
                    counter!(WS_CLOSE_TIMEOUTS_TOTAL).increment(1);
                    match self.shared.transport.close().await {
                        Ok(()) => Err(ConnError::CloseTimeout(self.close_timeout)),
                        Err(e) => Err(ConnError::Transport(e)),
                    }
                }
            }
        };

        self.join_workers().await;
        self.shared.advance(ConnectionState::Closed);
        result
    }

    /// Join both workers, aborting any that outlive the grace period.
    /// Holding the lock while joining makes concurrent `close` calls wait.
    async fn join_workers(&self) {
        let mut slot = self.workers.lock().await;
        let Some(workers) = slot.take() else {
            return;
        };
        let grace = self.shared.send_timeout;
        for (name, mut handle) in [("send", workers.send), ("recv", workers.recv)] {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!(worker = name, "worker still running after teardown, aborting");
                handle.abort();
            }
        }
        info!("connection closed");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }

    /// Attach a value to this connection.
    ///
    /// The side-store is for the owning caller (one writer at a time);
    /// interleaved writers from different tasks get last-write-wins.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.data.lock().insert(key.into(), value.into());
    }

    /// Read a value set with [`set`](Self::set).
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(workers) = self.workers.get_mut().take() {
            debug!(session_id = %self.id, "connection dropped without close, aborting workers");
            workers.send.abort();
            workers.recv.abort();
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        }
    }
}

async fn run_send_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<SendRequest>) {
    while let Some(req) = rx.recv().await {
        let deadline = Instant::now() + shared.send_timeout;
        let result = match tokio::time::timeout_at(
            deadline,
            shared.transport.write_text(req.payload, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::DeadlineExceeded),
        };
        if let Err(ref e) = result {
            debug!(session_id = %shared.id, error = %e, "write failed");
            counter!(WS_SEND_ERRORS_TOTAL).increment(1);
        }
        // the caller may have given up waiting
        let _ = req.result.send(result);
    }
    trace!(session_id = %shared.id, "send worker exited");
}

async fn run_recv_worker(
    shared: Arc<Shared>,
    tx: mpsc::Sender<Inbound>,
    closing: CancellationToken,
    done: CancellationToken,
) {
    let _done = done.drop_guard();

    let terminal = loop {
        match shared.transport.read_message().await {
            Ok(Frame::Text(text)) => {
                trace!(session_id = %shared.id, len = text.len(), "text frame received");
                match deliver(&tx, &closing, Inbound::Message(text)).await {
                    Delivery::Queued => {}
                    Delivery::Dropped => {
                        debug!(session_id = %shared.id, "inbound queue full while closing, dropped payload");
                        counter!(WS_INBOUND_DROPS_TOTAL).increment(1);
                    }
                    Delivery::Gone => break None,
                }
            }
            Ok(frame) => {
                trace!(session_id = %shared.id, kind = frame.kind(), "ignoring non-text frame");
            }
            Err(e) => break Some(e),
        }
    };

    match terminal {
        Some(e) if !e.is_clean_close() => {
            debug!(session_id = %shared.id, error = %e, "read failed");
            let _ = deliver(&tx, &closing, Inbound::Failed(e)).await;
        }
        _ => debug!(session_id = %shared.id, "inbound stream ended"),
    }

    // a failure here is cached and reported by `close`
    let _ = shared.send_close().await;

    shared.advance(ConnectionState::Closed);
    drop(tx);
    trace!(session_id = %shared.id, "receive worker exited");
}

/// Queue `item`, waiting for room unless the connection is closing.
async fn deliver(tx: &mpsc::Sender<Inbound>, closing: &CancellationToken, item: Inbound) -> Delivery {
    tokio::select! {
        biased;
        permit = tx.reserve() => match permit {
            Ok(permit) => {
                permit.send(item);
                Delivery::Queued
            }
            Err(_) => Delivery::Gone,
        },
        () = closing.cancelled() => Delivery::Dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPeer, MockTransport, PeerBehavior};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn settings() -> ConnectionSettings {
        ConnectionSettings::default()
    }

    fn open(behavior: PeerBehavior) -> (Arc<Connection>, Arc<MockTransport>, MockPeer) {
        let (transport, peer) = MockTransport::new(behavior);
        let conn = Connection::standalone("sess-1".into(), transport.clone(), &settings());
        (conn, transport, peer)
    }

    #[tokio::test]
    async fn sends_are_written_in_call_order() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        for i in 0..20 {
            conn.send(&format!("msg_{i}")).await.unwrap();
        }
        let written = transport.written();
        assert_eq!(written.len(), 20);
        for (i, w) in written.iter().enumerate() {
            assert_eq!(w, &format!("\"msg_{i}\""));
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_serializes_json() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        conn.send(&serde_json::json!({"type": "ping"})).await.unwrap();
        let written = transport.written();
        let parsed: serde_json::Value = serde_json::from_str(&written[0]).unwrap();
        assert_eq!(parsed["type"], "ping");
    }

    #[tokio::test]
    async fn concurrent_senders_all_succeed() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        let mut handles = Vec::new();
        for task in 0..8 {
            let conn = conn.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    conn.send_text(format!("{task}:{i}")).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let written = transport.written();
        assert_eq!(written.len(), 80);
        // per-producer order is preserved
        for task in 0..8 {
            let mine: Vec<_> = written
                .iter()
                .filter(|w| w.starts_with(&format!("{task}:")))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..10).map(|i| format!("{task}:{i}")).collect();
            assert_eq!(mine, expected);
        }
    }

    #[tokio::test]
    async fn write_error_reaches_only_that_sender() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        transport.set_write_error(Some(TransportError::io("broken pipe")));
        let err = conn.send_text("lost".into()).await.unwrap_err();
        assert_eq!(err.transport(), Some(&TransportError::io("broken pipe")));

        transport.set_write_error(None);
        conn.send_text("ok".into()).await.unwrap();
        assert_eq!(transport.written(), vec!["ok"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_fails_at_send_timeout() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        transport.stall_writes(true);
        let start = Instant::now();
        let err = conn.send_text("slow".into()).await.unwrap_err();
        assert_eq!(err.transport(), Some(&TransportError::DeadlineExceeded));
        assert_eq!(start.elapsed(), TIMEOUT);
    }

    #[tokio::test]
    async fn recv_yields_text_in_order_then_eof() {
        let (conn, _transport, peer) = open(PeerBehavior::EchoClose);
        for i in 0..5 {
            peer.send_text(format!("m{i}"));
        }
        peer.close();
        for i in 0..5 {
            assert_eq!(conn.recv().await.unwrap(), Some(format!("m{i}")));
        }
        assert_eq!(conn.recv().await.unwrap(), None);
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_text_frames_are_dropped() {
        let (conn, _transport, peer) = open(PeerBehavior::EchoClose);
        peer.send_frame(Frame::Binary(vec![1, 2, 3]));
        peer.send_frame(Frame::Ping);
        peer.send_text("hello");
        peer.send_frame(Frame::Pong);
        peer.close();
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_error_is_surfaced_once() {
        let (conn, transport, peer) = open(PeerBehavior::Silent);
        peer.fail(TransportError::io("connection reset by peer"));
        let err = conn.recv().await.unwrap_err();
        assert_eq!(
            err.transport(),
            Some(&TransportError::io("connection reset by peer"))
        );
        assert_eq!(conn.recv().await.unwrap(), None);
        // the receive worker sent the close frame on its own
        assert_eq!(transport.write_close_calls(), 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_close_returns_ok_before_timeout() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        let start = Instant::now();
        conn.close().await.unwrap();
        assert!(start.elapsed() < TIMEOUT);
        assert_eq!(transport.write_close_calls(), 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_close_times_out_with_error() {
        let (conn, transport, _peer) = open(PeerBehavior::Silent);
        let start = Instant::now();
        let err = conn.close().await.unwrap_err();
        assert!(matches!(err, ConnError::CloseTimeout(d) if d == TIMEOUT));
        assert_eq!(start.elapsed(), TIMEOUT);
        assert!(transport.is_torn_down());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_teardown_error() {
        let (conn, transport, _peer) = open(PeerBehavior::Silent);
        transport.set_teardown_error(Some(TransportError::io("use of closed socket")));
        let err = conn.close().await.unwrap_err();
        assert_eq!(
            err.transport(),
            Some(&TransportError::io("use of closed socket"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_close_frame_tears_down_immediately() {
        let (conn, transport, _peer) = open(PeerBehavior::Silent);
        transport.set_close_frame_error(Some(TransportError::io("broken pipe")));
        let start = Instant::now();
        let err = conn.close().await.unwrap_err();
        assert_eq!(err.transport(), Some(&TransportError::io("broken pipe")));
        assert!(start.elapsed() < TIMEOUT);
        assert!(transport.is_torn_down());
    }

    #[tokio::test]
    async fn double_close_sends_one_close_frame() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(transport.write_close_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_close_calls_complete() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        let a = tokio::spawn({
            let conn = conn.clone();
            async move { conn.close().await }
        });
        let b = tokio::spawn({
            let conn = conn.clone();
            async move { conn.close().await }
        });
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(transport.write_close_calls(), 1);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (conn, transport, _peer) = open(PeerBehavior::EchoClose);
        conn.close().await.unwrap();
        let err = conn.send_text("late".into()).await.unwrap_err();
        assert!(matches!(err, ConnError::Closing));
        assert!(transport.written().is_empty());
    }

    #[tokio::test]
    async fn peer_initiated_close_counts_as_sent() {
        let (conn, transport, peer) = open(PeerBehavior::Silent);
        peer.close();
        assert_eq!(conn.recv().await.unwrap(), None);
        // the library already answered, so our close frame is a no-op
        conn.close().await.unwrap();
        assert_eq!(transport.write_close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_inbound_queue_does_not_block_close() {
        let (conn, _transport, peer) = open(PeerBehavior::EchoClose);
        // more than the inbound capacity, nobody reading
        for i in 0..50 {
            peer.send_text(format!("m{i}"));
        }
        let start = Instant::now();
        conn.close().await.unwrap();
        assert!(start.elapsed() < TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_dropped_when_queue_full_during_close() {
        let (conn, _transport, peer) = open(PeerBehavior::Silent);
        // one past the inbound capacity, then the reset
        for i in 0..11 {
            peer.send_text(format!("m{i}"));
        }
        peer.fail(TransportError::io("connection reset by peer"));

        conn.close().await.unwrap();

        for i in 0..10 {
            assert_eq!(conn.recv().await.unwrap(), Some(format!("m{i}")));
        }
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_while_receiving_ends_recv_loop() {
        let (conn, _transport, peer) = open(PeerBehavior::EchoClose);
        peer.send_text("first");
        let reader = tokio::spawn({
            let conn = conn.clone();
            async move {
                let mut got = Vec::new();
                while let Ok(Some(msg)) = conn.recv().await {
                    got.push(msg);
                }
                got
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close().await.unwrap();
        assert_eq!(reader.await.unwrap(), vec!["first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_scenario() {
        let (transport, peer) = MockTransport::new(PeerBehavior::Silent);
        let hub = Arc::new(Hub::new());
        let conn = Connection::open("sess-1".into(), transport.clone(), &hub, &settings());
        assert!(hub.register(conn.clone()).is_none());

        conn.send(&"ping").await.unwrap();
        assert_eq!(transport.written(), vec!["\"ping\""]);

        peer.send_text("pong");
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("pong"));

        peer.fail(TransportError::io("connection reset by peer"));
        assert!(conn.recv().await.is_err());

        let start = Instant::now();
        conn.close().await.unwrap();
        assert!(start.elapsed() < TIMEOUT);
        assert!(hub.unregister(&conn));
        assert!(hub.lookup("sess-1").is_none());
    }

    #[tokio::test]
    async fn side_store_set_get() {
        let (conn, _transport, _peer) = open(PeerBehavior::EchoClose);
        assert!(conn.get("user").is_none());
        conn.set("user", "alice");
        assert_eq!(conn.get("user").as_deref(), Some("alice"));
        conn.set("user", "bob");
        assert_eq!(conn.get("user").as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn hub_back_reference() {
        let hub = Arc::new(Hub::new());
        let (transport, _peer) = MockTransport::new(PeerBehavior::EchoClose);
        let conn = Connection::open("sess-1".into(), transport, &hub, &settings());
        assert!(Arc::ptr_eq(&conn.hub().unwrap(), &hub));

        let (conn2, _t, _p) = open(PeerBehavior::EchoClose);
        assert!(conn2.hub().is_none());
    }

    #[tokio::test]
    async fn starts_open() {
        let (conn, _transport, _peer) = open(PeerBehavior::EchoClose);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.id().as_str(), "sess-1");
    }
}
