//! # authbridge-server
//!
//! HTTP surfaces and the `authbridge` command line for the flows in
//! [`authbridge_auth`]:
//!
//! - [`verifier::router`] - `GET /` bearer verification
//! - [`broker::router`] - `GET /` token brokering
//! - [`login::settle`] - browser login driven from a terminal
//! - [`cli`] - `authbridge verify | broker | login`
//! - [`logging`] - `tracing` subscriber setup

pub mod broker;
pub mod cli;
pub mod logging;
pub mod login;
pub mod verifier;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use logging::LoggingConfig;

/// Serve `app` on `addr` until Ctrl-C
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
