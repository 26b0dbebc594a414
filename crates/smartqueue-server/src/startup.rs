//! Server startup helper for embedding in the engine.
//!
//! [`spawn_server`] launches the HTTP server on a background Tokio task so
//! it runs alongside the control loop.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server address is unusable.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the HTTP server on a background task.
///
/// The address is checked before spawning so obvious misconfiguration is
/// reported to the caller; a bind failure inside the task is logged. The
/// server stops once `shutdown` resolves and in-flight requests finish.
pub fn spawn_server(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = config.socket_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&config, state, shutdown).await {
            tracing::error!(error = %e, "HTTP server exited with error");
        }
    });

    tracing::info!(%addr, "HTTP server spawned on background task");

    Ok(handle)
}
