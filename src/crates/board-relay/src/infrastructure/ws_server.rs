//! Listener: axum router, shutdown polling and per-connection WebSocket tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Routing every path by method: `GET` upgrades to a WebSocket session,
//!    `OPTIONS` and `POST` go to [`crate::infrastructure::http`], anything
//!    else is answered `405` by the method router.
//! 3. Running each WebSocket session as two concurrent halves:
//!    - **Writer**: drains the connection's broadcast channel into the socket.
//!    - **Reader**: spawns one router task per text frame.
//! 4. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Why a router task per frame?
//!
//! A `connect` for a board that is still coming up may wait seconds.  Running
//! each frame on its own task keeps a slow request from holding up the frames
//! behind it on the same socket.  Responses are broadcast when they complete,
//! so they may come back out of order; clients match them up by `id`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::response::Response;
use axum::routing::{get, MethodRouter};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::{RelayContext, RequestRouter};
use crate::domain::config::RelayConfig;
use crate::infrastructure::http;

/// How often the listener checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use), if `config.allowed_origin` is not a valid header value,
/// or if the server fails.
pub async fn run_server(
    config: RelayConfig,
    context: Arc<RelayContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

    info!("board relay listening on {}", config.bind_addr);
    serve(listener, &config, context, running).await
}

/// Serves the relay on an already bound `listener`.
///
/// Split from [`run_server`] so tests can bind port 0 and learn the address
/// before serving starts.
///
/// # Errors
///
/// Returns an error if `config.allowed_origin` is not a valid header value or
/// the server fails.
pub async fn serve(
    listener: TcpListener,
    config: &RelayConfig,
    context: Arc<RelayContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = build_router(RequestRouter::new(context), &config.allowed_origin)?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_requested(running))
    .await
    .context("relay server error")
}

/// Builds the HTTP router: the same method routes on every path, CORS for
/// `allowed_origin` on every response.
///
/// # Errors
///
/// Returns an error if `allowed_origin` is not a valid header value.
pub fn build_router(router: RequestRouter, allowed_origin: &str) -> anyhow::Result<Router> {
    let (cors, allow_headers) = http::cors_layers(allowed_origin)
        .with_context(|| format!("invalid allowed origin: '{allowed_origin}'"))?;

    Ok(Router::new()
        .route("/", relay_routes())
        .route("/{*path}", relay_routes())
        .with_state(router)
        .layer(DefaultBodyLimit::max(http::MAX_BODY_BYTES))
        .layer(allow_headers)
        .layer(cors))
}

fn relay_routes() -> MethodRouter<RequestRouter> {
    get(upgrade).options(http::preflight).post(http::echo)
}

/// Resolves once `running` is cleared.
async fn shutdown_requested(running: Arc<AtomicBool>) {
    let mut ticker = time::interval(SHUTDOWN_POLL);
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
    }
    info!("shutdown flag set; stopping listener");
}

// ── WebSocket sessions ────────────────────────────────────────────────────────

/// `GET`: completes the WebSocket handshake and hands the socket to
/// [`run_session`].  Requests without upgrade headers are rejected by the
/// extractor.
async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(router): State<RequestRouter>,
) -> Response {
    debug!("WebSocket upgrade from {peer_addr}");
    ws.on_upgrade(move |socket| run_session(socket, peer_addr, router))
}

/// Runs one WebSocket session from handshake to close.
async fn run_session(socket: WebSocket, peer_addr: SocketAddr, router: RequestRouter) {
    let broadcaster = router.context().broadcaster().clone();
    let (connection_id, mut outbound) = broadcaster.register();
    info!("connection {connection_id}: editor connected from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // ── Writer ─────────────────────────────────────────────────────────────────
    //
    // Ends when the broadcaster drops this connection's sender (unregister)
    // or the socket stops accepting writes.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                debug!("connection {connection_id}: WebSocket send failed (editor disconnected)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader ─────────────────────────────────────────────────────────────────
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("connection {connection_id}: WebSocket error: {e}");
                break;
            }
            None => {
                debug!("connection {connection_id}: stream ended");
                break;
            }
        };

        match ws_msg {
            WsMessage::Text(text) => {
                let router = router.clone();
                tokio::spawn(async move {
                    router.handle(text.as_str()).await;
                });
            }
            WsMessage::Binary(_) => {
                warn!("connection {connection_id}: unexpected binary frame (ignored)");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                debug!("connection {connection_id}: WebSocket ping/pong");
            }
            WsMessage::Close(_) => {
                debug!("connection {connection_id}: Close frame received");
                break;
            }
        }
    }

    broadcaster.unregister(connection_id);
    let _ = writer.await;
    info!("connection {connection_id}: editor disconnected");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
