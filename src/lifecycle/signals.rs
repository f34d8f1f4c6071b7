//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT or SIGTERM
//! - Trigger graceful shutdown of both hub endpoints or the registrant loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Falls back to Ctrl+C alone where Unix signals are unavailable

use crate::lifecycle::Shutdown;

/// Wait until the process is asked to stop.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Trigger `shutdown` on the first SIGINT or SIGTERM.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_signal_handler(shutdown: &Shutdown) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to install signal handler; shutting down"),
        }
        shutdown.trigger();
    });
}
