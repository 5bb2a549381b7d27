//! HTTP and WebSocket handlers for the Lifesync server.
//!
//! A client connects to `/room/{room}/player/{player}`; the upgraded socket
//! is handed to a [`ConnectionActor`] for the rest of its life.

use crate::actor::ConnectionActor;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lifesync_core::{room::validate_id, RoomHub};
use lifesync_transport::WebSocketConnection;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room hub.
    pub hub: RoomHub,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = RoomHub::with_config(config.hub_config()).on_room_evicted(metrics::set_active_rooms);

        Self { hub, config }
    }
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/room/:room/player/:player", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Run the HTTP/WebSocket server until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("Lifesync server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/room/{{room}}/player/{{player}}", addr);

    let state = Arc::new(AppState::new(config));
    serve(listener, state, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "connections": stats.connection_count,
        "players": stats.player_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    Path((room, player)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(reason) = validate_id(&room).and_then(|()| validate_id(&player)) {
        warn!(remote = %addr, reason, "Rejecting connection with invalid id");
        metrics::record_error("invalid_id");
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    let max_message_size = state.config.limits.max_message_size;

    ws.max_message_size(state.config.limits.frame_limit())
        .on_upgrade(move |socket| async move {
            let _metrics_guard = ConnectionMetricsGuard::new();
            debug!(remote = %addr, room = %room, player = %player, "WebSocket connected");

            let connection = WebSocketConnection::new(socket, max_message_size).with_remote_addr(addr);
            ConnectionActor::new(connection, state.hub.clone(), room, player)
                .run()
                .await;

            debug!(remote = %addr, "WebSocket disconnected");
        })
        .into_response()
}
