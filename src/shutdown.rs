//! Process-exit hook closing every tracked session

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::manager::SessionRegistry;

/// Termination signal that triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    /// Conventional exit status for a process ended by this signal
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
///
/// A signal whose handler cannot be installed is never reported.
pub async fn wait_for_shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            log::info!("Received Ctrl+C signal");
            ShutdownSignal::Interrupt
        }
        () = terminate => {
            log::info!("Received SIGTERM signal");
            ShutdownSignal::Terminate
        }
    }
}

/// Close every session of `registry` when the process is asked to terminate
///
/// Waits for a termination signal, closes all sessions (best effort), then
/// exits the process with the signal's conventional status. Detached jobs are
/// left running.
pub fn spawn_shutdown_hook(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_shutdown_signal().await;
        registry.shutdown().await;
        std::process::exit(signal.exit_code());
    })
}
