use anyhow::Result;
use args::{CliArgs, DriverConfig};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wave_portal_client::{InjectedPortal, PendingState};

mod args;
mod shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::ERROR.into())
        .with_default_directive("alloy_transport_ws=off".parse()?)
        .from_env_lossy()
        .add_directive("alloy=warn".parse()?)
        .add_directive("alloy_pubsub=error".parse()?)
        .add_directive("wave_portal=info".parse()?)
        .add_directive("wave_portal_client=info".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(filter)
        .init();

    let config = DriverConfig::load(CliArgs::parse())?;

    // Setup shutdown handler
    let shutdown_token = CancellationToken::new();
    let shutdown_token_clone = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown::shutdown_signal(shutdown_token_clone.clone()).await {
            error!(error = %e, "Failed to listen for shutdown signal");
            shutdown_token_clone.cancel();
        }
    });

    let portal = InjectedPortal::detect(&config.portal).await;

    if let Err(e) = portal.check_existing_connection().await {
        warn!(error = %e, "Could not check for an authorized account");
    }
    if config.connect && portal.has_wallet() && !portal.connection().is_connected() {
        if let Err(e) = portal.connect().await {
            warn!(error = %e, "Wallet connection failed");
        }
    }
    info!(connection = ?portal.connection(), "Wallet status");

    if !portal.has_wallet() {
        println!("{}", serde_json::to_string_pretty(&portal.view().await)?);
        return Ok(());
    }

    if let Err(e) = portal.load_waves().await {
        warn!(error = %e, "Starting without historical waves");
    }
    // Live waves are followed only once an account is connected
    let mounted = if portal.connection().is_connected() {
        Some(portal.mount()?)
    } else {
        info!("No connected account, not following live waves");
        None
    };

    if let Some(message) = &config.message {
        send_wave(&portal, message, &shutdown_token).await;
    }

    info!("Press Ctrl+C to gracefully shutdown");
    shutdown_token.cancelled().await;

    drop(mounted);
    let view = portal.view().await;
    info!(waves = view.waves.len(), "Shutdown complete");
    println!("{}", serde_json::to_string_pretty(&view)?);

    Ok(())
}

/// Send one wave and follow it until it settles or shutdown is requested.
async fn send_wave(portal: &InjectedPortal, message: &str, shutdown: &CancellationToken) {
    if let Err(e) = portal.total_waves().await {
        warn!(error = %e, "Failed to read total waves");
    }

    let mut pending = match portal.send(message).await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "Failed to send wave");
            return;
        }
    };

    let tx_hash = pending.tx();
    tokio::select! {
        _ = shutdown.cancelled() => {
            warn!(tx_hash = %tx_hash, "Shutdown requested before the wave settled");
        }
        settled = pending.wait() => match settled {
            PendingState::Mined(confirmation) => {
                info!(
                    tx_hash = %tx_hash,
                    gas_used = confirmation.gas_used,
                    "Wave mined"
                );
                if let Err(e) = portal.total_waves().await {
                    warn!(error = %e, "Failed to read total waves");
                }
            }
            PendingState::Failed(e) => {
                warn!(tx_hash = %tx_hash, error = %e, "Wave did not settle");
            }
            PendingState::Submitted => {}
        }
    }
}
