//! Server startup for the Singalong media server
//!
//! Wires the startup configuration into the shared state and runs the HTTP
//! listener until shutdown.

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::registry::MediaRoots;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for server operations
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener failed while serving
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Server state containing the configuration and shared components
pub struct Server {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Registry, queue and media streamer shared with every request
    state: AppState,
}

impl Server {
    /// Initialize the server from a loaded configuration
    ///
    /// The configured media paths become the initial roots; they can be
    /// replaced later through `POST /config`.
    pub fn new(config: Config) -> Self {
        let state = AppState::new(MediaRoots::from(&config.media));
        Self { config, state }
    }

    /// Get a clone of the shared state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router over the shared state
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<BoundServer, ServerError> {
        let host = self.config.server.host.as_str();
        let port = self.config.server.port;
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{}", host, port),
                source,
            })?;

        Ok(BoundServer {
            listener,
            router: self.router(),
        })
    }

    /// Bind and serve until Ctrl-C
    pub async fn run(&self) -> Result<(), ServerError> {
        let bound = self.bind().await?;
        bound.serve(shutdown_signal()).await
    }
}

/// A server whose socket is already listening
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
}

impl BoundServer {
    /// Address actually bound (useful when the port was 0)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    /// Serve requests until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "listening");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
