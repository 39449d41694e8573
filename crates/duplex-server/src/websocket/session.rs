//! Session lifecycle: one connected client from upgrade through disconnect.

use std::sync::Arc;

use duplex_core::SessionId;
use duplex_core::settings::ConnectionSettings;
use duplex_ws::{Connection, Hub, Transport};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Build the greeting sent once the session is registered.
pub fn established_message(session_id: &SessionId) -> Value {
    json!({
        "type": "connection.established",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": {
            "sessionId": session_id,
        },
    })
}

/// Build the reply for one inbound payload. JSON payloads are echoed as
/// structured data, anything else as a string.
pub fn echo_message(session_id: &SessionId, text: &str) -> Value {
    let data = serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_owned()));
    json!({
        "type": "echo",
        "sessionId": session_id,
        "data": data,
    })
}

/// Run a session until the peer goes away or `shutdown` fires.
///
/// 1. Wraps `transport` in a [`Connection`] and registers it, closing any
///    connection it displaces
/// 2. Sends `connection.established`
/// 3. Echoes every inbound text payload
/// 4. Closes the connection and unregisters it
#[instrument(skip_all, fields(session_id = %id))]
pub async fn run_session(
    id: SessionId,
    transport: Arc<dyn Transport>,
    hub: Arc<Hub>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) {
    let conn = Connection::open(id.clone(), transport, &hub, &settings);
    if let Some(displaced) = hub.register(conn.clone()) {
        let _ = tokio::spawn(async move {
            if let Err(e) = displaced.close().await {
                debug!(error = %e, "displaced connection closed with error");
            }
        });
    }
    info!("session started");

    if let Err(e) = conn.send(&established_message(&id)).await {
        warn!(error = %e, "failed to send greeting");
    }

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("server shutting down, ending session");
                break;
            }
            next = conn.recv() => next,
        };
        match next {
            Ok(Some(text)) => {
                debug!(len = text.len(), "payload received");
                if let Err(e) = conn.send(&echo_message(&id, &text)).await {
                    debug!(error = %e, "echo failed, ending session");
                    break;
                }
            }
            Ok(None) => break,
            // surfaced once; the next recv reports end of stream
            Err(e) => debug!(error = %e, "read failed"),
        }
    }

    if let Err(e) = conn.close().await {
        debug!(error = %e, "close finished with error");
    }
    let _ = hub.unregister(&conn);
    info!("session ended");
}
