use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::services::manager::ServiceManager;
use crate::utils::fmt_duration;

/// Wait for SIGINT/SIGTERM or the first service exit, then shut everything
/// down within `timeout`.
pub async fn handle_shutdown_signals(mut manager: ServiceManager, timeout: Duration) -> ExitCode {
    let exit_code = tokio::select! {
        (name, result) = manager.wait_for_exit() => {
            match result {
                Ok(()) => warn!(service = name, "service exited unexpectedly"),
                Err(e) => error!(service = name, error = ?e, "service failed"),
            }
            ExitCode::FAILURE
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            ExitCode::SUCCESS
        }
    };

    info!(timeout = fmt_duration(timeout), "shutting down services");
    match manager.shutdown(timeout).await {
        Ok(elapsed) => {
            info!(elapsed = fmt_duration(elapsed), "graceful shutdown complete");
            exit_code
        }
        Err(pending) => {
            warn!(pending = ?pending, "shutdown timed out");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
