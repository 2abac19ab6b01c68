//! HTTP surface
//!
//! Routes the WebSocket upgrade, the out-of-band leave request, and static
//! client assets. Unknown asset paths fall back to `index.html` so the web
//! client can route them itself.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::handler::{leave_handler, websocket_handler};
use crate::registry::RoomRegistry;

/// State shared by all request handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            config,
        }
    }
}

/// Build the application router
pub fn router(state: AppState, web_root: &Path) -> Router {
    let assets = ServeDir::new(web_root).fallback(ServeFile::new(web_root.join("index.html")));

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/leave", post(leave_handler))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until the process exits
pub async fn serve(listener: TcpListener, app: Router) -> io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
