//! HTTP and WebSocket front end for Bot Monitor.
//!
//! Serves the viewer page, the live event socket and the small JSON API
//! used by the page's buttons. All state lives in the [`Monitor`] handle.

pub mod error;
mod handlers;
mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use monitor_runtime::Monitor;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    /// Flipped to `true` when the server is stopping so open sockets close.
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(monitor: Monitor) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            monitor,
            shutdown: Arc::new(shutdown),
        }
    }
}

/// Build the application router.
pub fn router(monitor: Monitor) -> Router {
    routes(AppState::new(monitor))
}

fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(ws::ws_handler))
        .route("/command", post(handlers::submit_command))
        .route("/control/{action}", post(handlers::control))
        .route("/meta", get(handlers::meta))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve until `shutdown` resolves. Open viewer sockets are closed first so
/// the graceful drain does not wait on them.
pub async fn serve<F>(listener: TcpListener, monitor: Monitor, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, bot = %monitor.bot_name(), "monitor online at http://{addr}");
    }
    let state = AppState::new(monitor);
    let stop = Arc::clone(&state.shutdown);
    axum::serve(listener, routes(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            stop.send_replace(true);
        })
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
