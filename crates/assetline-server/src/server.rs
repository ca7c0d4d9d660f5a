//! Development server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::LazyLock;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use regex::Regex;
use tower_http::services::ServeDir;

use crate::websocket::{reload_client_script, ReloadHub, ReloadMessage};

/// Path of the live reload WebSocket.
pub const RELOAD_SOCKET_PATH: &str = "/__livereload";

/// Path of the live reload client script.
pub const RELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Largest HTML response the reload injection will buffer.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

static BODY_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("Invalid body close regex"));

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Inject the reload client and accept reload connections
    pub live_reload: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
            live_reload: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Server error on {0}: {1}")]
    ServeError(SocketAddr, String),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            hub: ReloadHub::new(),
        }
    }

    /// The hub that pushes reload messages to this server's clients.
    pub fn hub(&self) -> ReloadHub {
        self.hub.clone()
    }

    /// The socket address from the configured host and port.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        let raw = format!("{}:{}", self.config.host, self.config.port);
        raw.parse().map_err(|_| ServerError::InvalidAddress(raw))
    }

    /// Build the router: static files from the root, plus the reload
    /// endpoints and HTML injection when live reload is on.
    pub fn router(&self) -> Router {
        let files = ServeDir::new(&self.config.root);
        if !self.config.live_reload {
            return Router::new().fallback_service(files);
        }

        Router::new()
            .fallback_service(files)
            .layer(middleware::from_fn(inject_reload))
            .route(RELOAD_SOCKET_PATH, get(ws_handler))
            .route(RELOAD_SCRIPT_PATH, get(reload_script_handler))
            .with_state(self.hub.clone())
    }

    /// Bind and serve until the process ends.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr = self.addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        tracing::info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            addr
        );

        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::debug!("Could not open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::ServeError(addr, e.to_string()))
    }
}

/// Insert the reload script tag before the last `</body>`, or append it when
/// the document has none.
pub fn inject_reload_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, RELOAD_SCRIPT_PATH);
    match BODY_CLOSE_RE.find_iter(html).last() {
        Some(close) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..close.start()]);
            out.push_str(&tag);
            out.push_str(&html[close.start()..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

/// Middleware rewriting HTML responses to load the reload client.
async fn inject_reload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Could not buffer HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_reload_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one browser until it disconnects.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();
    tracing::debug!("Reload client connected ({} total)", hub.subscriber_count());

    if send(&mut socket, ReloadMessage::Connected).await.is_err() {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if send(&mut socket, msg).await.is_err() {
            break;
        }
    }
}

async fn send(socket: &mut WebSocket, msg: ReloadMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(&msg) {
        Ok(json) => json,
        Err(e) => return Err(axum::Error::new(e)),
    };
    socket.send(Message::Text(json.into())).await
}

/// Handler for the reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript"),
        )],
        reload_client_script(),
    )
}
