//! [`Transport`] over an upgraded axum [`WebSocket`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use duplex_ws::{Frame, Transport, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Socket halves behind async mutexes so writers are serialized and the
/// single reader can be interrupted by [`Transport::close`].
///
/// Teardown drops both halves, which drops the underlying TCP stream.
pub struct AxumTransport {
    sink: Mutex<Option<SplitSink<WebSocket, Message>>>,
    stream: Mutex<Option<SplitStream<WebSocket>>>,
    close_sent: AtomicBool,
    torn_down: CancellationToken,
}

impl AxumTransport {
    /// Take ownership of an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            close_sent: AtomicBool::new(false),
            torn_down: CancellationToken::new(),
        }
    }

    async fn write(&self, msg: Message, deadline: Instant) -> Result<(), TransportError> {
        let write = async {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::Closed)?;
            sink.send(msg).await.map_err(|e| TransportError::io(e.to_string()))
        };
        tokio::select! {
            () = self.torn_down.cancelled() => Err(TransportError::Closed),
            res = tokio::time::timeout_at(deadline, write) => {
                res.unwrap_or(Err(TransportError::DeadlineExceeded))
            }
        }
    }
}

/// Map an axum message to the connection's frame type.
pub(crate) fn frame_from_message(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(_) => Frame::Close,
    }
}

#[async_trait]
impl Transport for AxumTransport {
    async fn write_text(&self, payload: String, deadline: Instant) -> Result<(), TransportError> {
        if self.close_sent.load(Ordering::Acquire) {
            return Err(TransportError::CloseSent);
        }
        self.write(Message::Text(payload.into()), deadline).await
    }

    async fn write_close(&self, deadline: Instant) -> Result<(), TransportError> {
        if self.close_sent.swap(true, Ordering::AcqRel) {
            return Err(TransportError::CloseSent);
        }
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Utf8Bytes::from_static(""),
        };
        self.write(Message::Close(Some(frame)), deadline).await
    }

    async fn read_message(&self) -> Result<Frame, TransportError> {
        let mut stream = self.stream.lock().await;
        let Some(stream) = stream.as_mut() else {
            return Err(TransportError::Closed);
        };
        let next = tokio::select! {
            biased;
            () = self.torn_down.cancelled() => return Err(TransportError::Closed),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(msg)) => {
                let frame = frame_from_message(msg);
                if frame == Frame::Close {
                    // the socket library queues the close reply itself
                    self.close_sent.store(true, Ordering::Release);
                }
                Ok(frame)
            }
            Some(Err(e)) => Err(TransportError::io(e.to_string())),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.torn_down.cancel();
        let sink = self.sink.lock().await.take();
        let stream = self.stream.lock().await.take();
        if sink.is_some() || stream.is_some() {
            debug!("websocket torn down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn text_maps_to_text_frame() {
        let frame = frame_from_message(Message::Text("hello".into()));
        assert_eq!(frame, Frame::Text("hello".into()));
    }

    #[test]
    fn binary_keeps_payload() {
        let frame = frame_from_message(Message::Binary(Bytes::from_static(&[1, 2, 3])));
        assert_eq!(frame, Frame::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn control_frames() {
        assert_eq!(frame_from_message(Message::Ping(Bytes::new())), Frame::Ping);
        assert_eq!(frame_from_message(Message::Pong(Bytes::new())), Frame::Pong);
        assert_eq!(frame_from_message(Message::Close(None)), Frame::Close);
    }
}
