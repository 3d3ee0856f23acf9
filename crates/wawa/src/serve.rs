// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wawa serve` command implementation.
//!
//! Opens the SQLite store, restores credentialed device sessions into the
//! connection registry, and runs the blast worker until SIGINT or SIGTERM.
//! The bundled loopback transport stands in for a live provider connection,
//! so a fresh checkout can exercise the whole pipeline locally.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wawa_blast::{BlastWorker, RateLimiter};
use wawa_config::model::WawaConfig;
use wawa_core::WawaError;
use wawa_session::{ConnectionRegistry, LoopbackTransport};
use wawa_storage::Database;

/// Runs the `wawa serve` command.
///
/// Wires storage, the connection registry, and the blast worker together,
/// then blocks until a shutdown signal arrives. The worker is drained
/// before the database is closed so in-flight accounting commits.
pub async fn run_serve(config: WawaConfig) -> Result<(), WawaError> {
    init_tracing(&config.agent.log_level);

    info!(name = %config.agent.name, "starting wawa serve");

    let db = Database::open(&config.storage.database_path).await?;

    let registry = ConnectionRegistry::new(
        db.clone(),
        Arc::new(LoopbackTransport::new()),
        config.session.clone(),
    );

    let restored = registry.restore_sessions().await?;
    if restored > 0 {
        info!(restored, "device sessions restored");
    } else {
        debug!("no credentialed devices to restore");
    }

    let limiter = Arc::new(RateLimiter::from_config(&config.blast));
    let worker = BlastWorker::new(
        db.clone(),
        registry.clone(),
        limiter,
        config.blast.clone(),
    );

    let shutdown = install_signal_handler();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    shutdown.cancelled().await;
    info!("shutting down");

    if let Err(e) = worker_handle.await {
        warn!(error = %e, "blast worker task did not stop cleanly");
    }
    db.close().await?;
    info!("wawa serve stopped");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
/// The signal handler task runs in the background until the token is cancelled.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wawa={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_token() {
        let token = install_signal_handler();
        // Token should not be cancelled yet.
        assert!(!token.is_cancelled());
        // Cancel it manually to clean up the background task.
        token.cancel();
    }
}
