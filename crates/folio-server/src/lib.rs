//! Folio Server - HTTP API server.
//!
//! This crate provides the HTTP surface of the Folio reading dashboard
//! backend.
//!
//! ## Endpoints
//!
//! - `GET /api/books/proxy/iframe?url=..&token=..` - Proxy a page for iframe embedding
//! - `GET /api/books/proxy/extract?url=..` - Extract a chapter number from a URL
//! - `GET /api/health` - Liveness check
//!
//! ## Example
//!
//! ```no_run
//! use folio_core::{JwtCodec, ProxySettings};
//! use folio_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let codec = JwtCodec::new("change-me");
//!     let server = Server::new(ServerConfig::default(), &ProxySettings::default(), codec).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use folio_core::{JwtCodec, ProxySettings};
use folio_proxy::ProxyError;
use folio_storage::Database;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 3001).
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
        }
    }
}

impl ServerConfig {
    /// Creates a config with a specific database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] folio_storage::StorageError),

    /// Proxy setup error.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    // The dashboard frontend runs on its own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let proxy_routes = Router::new()
        .route(
            "/iframe",
            get(handlers::proxy_iframe).route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::attach_identity,
            )),
        )
        .route("/extract", get(handlers::extract_chapter));

    Router::new()
        .nest("/api/books/proxy", proxy_routes)
        .route("/api/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub fn new(
        config: ServerConfig,
        settings: &ProxySettings,
        codec: JwtCodec,
    ) -> std::result::Result<Self, ServerError> {
        let db = if let Some(ref path) = config.db_path {
            Database::with_path(path)?
        } else {
            Database::in_memory()?
        };

        let state = AppState::new(db, settings, codec)?;
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until Ctrl-C.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Folio API server on {}", self.addr);

        // SO_REUSEADDR lets a restart bind while old sockets linger in TIME_WAIT
        let socket = Socket::new(
            Domain::for_address(self.addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
