//! HTTP and WebSocket front
//!
//! Three routes:
//! - `GET /` serves `index.html` from the static directory
//! - `GET /index.js` serves `index.js` from the static directory
//! - `GET /ws` upgrades to a WebSocket and hands it to [`supervise`]
//!
//! Static files are read on every request and sent verbatim.

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chatrelay_core::{ClientKey, WS_PATH};
use chatrelay_transport::split_socket;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{error::Result, router::RouterHandle, session::supervise};

/// Body sent when a static file cannot be read
pub const STATIC_ERROR_BODY: &str = "500 internal server error";

#[derive(Clone)]
struct AppState {
    router: RouterHandle,
    static_dir: Arc<PathBuf>,
}

/// Build the axum application.
///
/// The WebSocket route needs [`ConnectInfo`], so serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_app(router: RouterHandle, static_dir: impl Into<PathBuf>) -> Router {
    let state = AppState {
        router,
        static_dir: Arc::new(static_dir.into()),
    };

    Router::new()
        .route("/", get(index_page))
        .route("/index.js", get(index_script))
        .route(WS_PATH, get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_page(State(state): State<AppState>) -> Response {
    serve_static(&state.static_dir, "index.html", "text/html; charset=utf-8").await
}

async fn index_script(State(state): State<AppState>) -> Response {
    serve_static(
        &state.static_dir,
        "index.js",
        "application/javascript; charset=utf-8",
    )
    .await
}

async fn serve_static(dir: &Path, name: &str, content_type: &'static str) -> Response {
    match tokio::fs::read(dir.join(name)).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            warn!(file = name, dir = %dir.display(), error = %e, "Could not read static file");
            (StatusCode::INTERNAL_SERVER_ERROR, STATIC_ERROR_BODY).into_response()
        }
    }
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_websocket(socket, addr, state.router))
}

async fn run_websocket(socket: WebSocket, addr: SocketAddr, router: RouterHandle) {
    let (sender, reader) = split_socket(socket);
    supervise(ClientKey::from(addr), reader, sender, router).await;
}

/// Listening relay server
pub struct RelayServer {
    listener: TcpListener,
    app: Router,
}

impl RelayServer {
    /// Bind the listen address and prepare the application
    pub async fn bind(
        addr: impl ToSocketAddrs,
        router: RouterHandle,
        static_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            app: build_app(router, static_dir),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the listener fails
    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Relay listening on http://{} (WebSocket at {})", addr, WS_PATH);

        axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}
