//! Graceful shutdown utilities
//!
//! Provides unified shutdown signal handling for all services.

use tracing::{info, warn};

/// Which signal ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
///
/// On Windows only Ctrl+C is observed.
///
/// ```ignore
/// let signal = common::shutdown::wait_for_shutdown().await;
/// engine.close().await;
/// ```
pub async fn wait_for_shutdown() -> ShutdownSignal {
    let signal = wait_for_signal().await;
    info!("Shutdown signal received: {:?}", signal);
    signal
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let term_signal = match signal(SignalKind::terminate()) {
        Ok(sig) => Some(sig),
        Err(e) => {
            warn!(
                "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                e
            );
            None
        },
    };

    tokio::select! {
        _ = interrupt() => ShutdownSignal::Interrupt,
        _ = async {
            if let Some(mut sig) = term_signal {
                sig.recv().await;
            } else {
                // Only Ctrl+C remains
                std::future::pending::<()>().await
            }
        } => ShutdownSignal::Terminate,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownSignal {
    interrupt().await;
    ShutdownSignal::Interrupt
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await
    }
}
