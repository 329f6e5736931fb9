use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `shutdown_token` on Ctrl+C / SIGTERM
pub async fn shutdown_signal(shutdown_token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Shutdown signal received (SIGTERM)");
            }
            _ = sigint.recv() => {
                info!("Shutdown signal received (SIGINT/Ctrl+C)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received (Ctrl+C)");
    }

    shutdown_token.cancel();
    Ok(())
}
