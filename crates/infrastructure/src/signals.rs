//! OS signal listener
//!
//! SIGINT and SIGTERM run the same shutdown sequence as an exhausted fatal
//! budget, with exit codes 130 and 143.

use std::sync::Arc;

use logshield_application::lifecycle::{ShutdownCoordinator, ShutdownReason};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

async fn wait_for_sigint() -> ShutdownReason {
    match signal::ctrl_c().await {
        Ok(()) => ShutdownReason::SigInt,
        Err(e) => {
            error!(error = %e, "Failed to register SIGINT handler");
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> ShutdownReason {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
            ShutdownReason::SigTerm
        }
        Err(e) => {
            error!(error = %e, "Failed to register SIGTERM handler");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> ShutdownReason {
    std::future::pending().await
}

/// Spawn the listener. A failed registration only disables that signal.
pub fn start_signal_handler(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = tokio::select! {
            reason = wait_for_sigint() => reason,
            reason = wait_for_sigterm() => reason,
        };

        info!(reason = %reason, "Received shutdown signal");
        coordinator.initiate(reason).await;
    })
}
