//! HTTP and WebSocket server.
//!
//! A single axum server hosts the request/response routes and the command
//! channel. `start()` binds the listener and spawns the server task;
//! `shutdown()` cancels the shared token and waits for the task.

pub mod routes;
pub mod ws;

use std::net::SocketAddr;

use axum::routing::{delete, get, post};
use axum::Router;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use routes::{ApiError, AppState};

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server is already running")]
    AlreadyRunning,
}

/// Builds the application router.
pub fn build_router(state: AppState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/", get(routes::root))
        .route("/status", get(routes::status))
        .route("/pairing/offer", get(routes::pairing_offer))
        .route("/pairing/complete", post(routes::complete_pairing))
        .route("/devices", get(routes::list_devices))
        .route("/devices/{device_id}", delete(routes::revoke_device))
        .route("/files", get(routes::list_files))
        .route("/sessions", get(routes::list_sessions))
        .route("/channel/{device_id}", get(ws::channel_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// The host's HTTP server.
pub struct HttpServer {
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl HttpServer {
    /// Creates a server that will bind to `addr`.
    ///
    /// `shutdown` is shared with the channel tasks so that cancelling it
    /// stops both the listener and every open channel.
    pub fn new(addr: SocketAddr, shutdown: CancellationToken) -> Self {
        Self {
            addr,
            local_addr: None,
            handle: None,
            shutdown,
        }
    }

    /// Binds the listener and spawns the server task.
    pub async fn start(&mut self, app: Router) -> Result<SocketAddr, ServerError> {
        if self.handle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.addr,
            source,
        })?;

        tracing::info!("HTTP server listening on {}", local_addr);

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    tracing::info!("HTTP server shutting down");
                })
                .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        self.local_addr = Some(local_addr);
        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Returns the bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signals graceful shutdown and waits for the server task to finish.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.local_addr = None;
    }
}
