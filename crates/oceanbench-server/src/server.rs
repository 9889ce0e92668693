//! Serving lifecycle for the cron trigger surface.
//!
//! The only callers of this process are the cron service (tick
//! triggers) and deployment probes, so serving stays deliberately
//! small: bind the configured address, serve the router, and drain
//! cooperatively on Ctrl-C so a tick that is mid-commit finishes its
//! transactional updates before the process exits.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerSection;
use crate::router::build_router;
use crate::state::AppState;

/// Errors from the serving lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The configured `server.host`/`server.port` pair does not form a
    /// socket address.
    #[error("bad bind address {addr:?}: {reason}")]
    Address {
        /// The `host:port` string that failed to parse.
        addr: String,
        /// Parser detail.
        reason: std::net::AddrParseError,
    },

    /// The tick endpoint could not come up on its port; the cron
    /// service would tick into a dead socket.
    #[error("cannot listen on {addr}: {source}")]
    Listen {
        /// The resolved socket address.
        addr: SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Serving fell over after startup.
    #[error("serving failed: {0}")]
    Serve(std::io::Error),
}

/// Serve the tick and health endpoints until the process is told to
/// stop.
///
/// Shutdown is cooperative: on Ctrl-C the listener closes and requests
/// already in flight (a site tick mid-commit, for instance) run to
/// completion before this returns.
///
/// # Errors
///
/// Returns [`ServeError`] if the address is unusable or serving hits a
/// fatal I/O error.
pub async fn start_server(section: &ServerSection, state: Arc<AppState>) -> Result<(), ServeError> {
    let addr_str = format!("{}:{}", section.host, section.port);
    let addr: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(reason) => {
            return Err(ServeError::Address {
                addr: addr_str,
                reason,
            })
        }
    };

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Listen { addr, source })?;

    info!(%addr, authenticated = state.auth.is_some(), "Tick endpoint ready at /checkbroadcasts");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServeError::Serve)
}

/// Resolves once the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // No signal handler means no clean shutdown path; serve until
        // the process is killed outright.
        tracing::warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested; draining in-flight ticks");
}
