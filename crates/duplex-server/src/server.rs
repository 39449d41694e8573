//! `DuplexServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use duplex_core::SessionId;
use duplex_core::settings::DuplexSettings;
use duplex_ws::Hub;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::AxumTransport;
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub hub: Arc<Hub>,
    /// Effective settings.
    pub settings: Arc<DuplexSettings>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// Query string of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Session to open; a fresh ID is generated when absent.
    pub session: Option<String>,
}

/// The duplex server.
pub struct DuplexServer {
    settings: Arc<DuplexSettings>,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl DuplexServer {
    /// Create a new server.
    pub fn new(settings: DuplexSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            hub: Arc::new(Hub::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            settings: self.settings.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };
        // bounds producing the 101 response; the socket itself is driven by
        // the session's own send and close deadlines
        let handshake = TimeoutLayer::new(self.settings.connection.handshake_timeout());

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler).layer(handshake))
            .route("/sessions/{id}/messages", post(post_message))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "duplex server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the session hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the effective settings.
    pub fn settings(&self) -> &DuplexSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.hub))
}

/// GET /ws: upgrade into a session.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let max = state.settings.server.max_connections;
    if state.hub.len() >= max {
        warn!(max, "rejecting websocket upgrade, connection limit reached");
        counter!("ws_upgrades_rejected_total").increment(1);
        return ServerError::AtCapacity(max).into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let id = params
        .session
        .filter(|s| !s.is_empty())
        .map_or_else(SessionId::new, SessionId::from);
    debug!(session_id = %id, "upgrading");

    ws.max_message_size(state.settings.server.max_message_size)
        .on_upgrade(move |socket| async move {
            let transport = Arc::new(AxumTransport::new(socket));
            run_session(
                id,
                transport,
                state.hub.clone(),
                state.settings.connection.clone(),
                state.shutdown.token(),
            )
            .await;
        })
}

/// POST /sessions/{id}/messages: push a JSON message into a live session.
async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ServerError> {
    let conn = state
        .hub
        .lookup(&id)
        .ok_or_else(|| ServerError::SessionNotFound(id.clone()))?;
    conn.send(&body).await?;
    debug!(session_id = %id, "message delivered");
    Ok(StatusCode::ACCEPTED)
}
