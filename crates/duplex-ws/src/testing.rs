//! In-memory [`Transport`] for tests.
//!
//! [`MockTransport`] plays the socket; the paired [`MockPeer`] scripts what
//! the remote end sends. Everything written is recorded for assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::transport::{Frame, Transport};

type Scripted = Result<Frame, TransportError>;

/// How the scripted peer reacts to our close frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Reply with a close frame and end the stream.
    EchoClose,
    /// Never answer; reads block until the socket is torn down.
    Silent,
}

/// Scripted socket.
pub struct MockTransport {
    behavior: PeerBehavior,
    frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
    echo: mpsc::UnboundedSender<Scripted>,
    written: Mutex<Vec<String>>,
    write_error: Mutex<Option<TransportError>>,
    close_frame_error: Mutex<Option<TransportError>>,
    teardown_error: Mutex<Option<TransportError>>,
    stall_writes: AtomicBool,
    close_sent: AtomicBool,
    read_failed: AtomicBool,
    write_close_calls: AtomicUsize,
    close_calls: AtomicUsize,
    torn_down: CancellationToken,
}

/// Remote end of a [`MockTransport`].
#[derive(Clone)]
pub struct MockPeer {
    tx: mpsc::UnboundedSender<Scripted>,
}

impl MockTransport {
    /// Create a socket and the handle that scripts its peer.
    pub fn new(behavior: PeerBehavior) -> (Arc<Self>, MockPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            behavior,
            frames: tokio::sync::Mutex::new(rx),
            echo: tx.clone(),
            written: Mutex::new(Vec::new()),
            write_error: Mutex::new(None),
            close_frame_error: Mutex::new(None),
            teardown_error: Mutex::new(None),
            stall_writes: AtomicBool::new(false),
            close_sent: AtomicBool::new(false),
            read_failed: AtomicBool::new(false),
            write_close_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            torn_down: CancellationToken::new(),
        });
        (transport, MockPeer { tx })
    }

    /// Text payloads written so far, in write order.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// How many times `write_close` was invoked.
    pub fn write_close_calls(&self) -> usize {
        self.write_close_calls.load(Ordering::SeqCst)
    }

    /// How many times `close` (teardown) was invoked.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether `close` has torn the socket down.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.is_cancelled()
    }

    /// Fail every subsequent `write_text` with `err` (`None` restores writes).
    pub fn set_write_error(&self, err: Option<TransportError>) {
        *self.write_error.lock() = err;
    }

    /// Fail `write_close` with `err`.
    pub fn set_close_frame_error(&self, err: Option<TransportError>) {
        *self.close_frame_error.lock() = err;
    }

    /// Fail `close` with `err` (the socket is still torn down).
    pub fn set_teardown_error(&self, err: Option<TransportError>) {
        *self.teardown_error.lock() = err;
    }

    /// Make writes hang until their deadline.
    pub fn stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_text(&self, payload: String, deadline: Instant) -> Result<(), TransportError> {
        if self.torn_down.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.close_sent.load(Ordering::SeqCst) {
            return Err(TransportError::CloseSent);
        }
        if self.stall_writes.load(Ordering::SeqCst) {
            return tokio::select! {
                () = tokio::time::sleep_until(deadline) => Err(TransportError::DeadlineExceeded),
                () = self.torn_down.cancelled() => Err(TransportError::Closed),
            };
        }
        if let Some(err) = self.write_error.lock().clone() {
            return Err(err);
        }
        self.written.lock().push(payload);
        Ok(())
    }

    async fn write_close(&self, _deadline: Instant) -> Result<(), TransportError> {
        let _ = self.write_close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.close_frame_error.lock().clone() {
            return Err(err);
        }
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return Err(TransportError::CloseSent);
        }
        if self.behavior == PeerBehavior::EchoClose {
            let _ = self.echo.send(Ok(Frame::Close));
            let _ = self.echo.send(Err(TransportError::Closed));
        }
        Ok(())
    }

    async fn read_message(&self) -> Result<Frame, TransportError> {
        if self.read_failed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut frames = self.frames.lock().await;
        let next = tokio::select! {
            biased;
            () = self.torn_down.cancelled() => Err(TransportError::Closed),
            item = frames.recv() => item.unwrap_or(Err(TransportError::Closed)),
        };
        match &next {
            // the socket library answers a peer close on its own
            Ok(Frame::Close) => self.close_sent.store(true, Ordering::SeqCst),
            Err(_) => self.read_failed.store(true, Ordering::SeqCst),
            Ok(_) => {}
        }
        next
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.torn_down.cancel();
        match self.teardown_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MockPeer {
    /// Deliver a text frame.
    pub fn send_text(&self, text: impl Into<String>) {
        self.send_frame(Frame::Text(text.into()));
    }

    /// Deliver any frame.
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    /// End the stream with a read error.
    pub fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }

    /// Start a close handshake from the peer side.
    pub fn close(&self) {
        self.send_frame(Frame::Close);
        let _ = self.tx.send(Err(TransportError::Closed));
    }
}
