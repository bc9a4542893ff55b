//! Signaling-Relay für P2P Audio
//!
//! Bind-Adresse über `RELAY_ADDR` (Standard `0.0.0.0:8787`),
//! Log-Level über `RUST_LOG`.

use anyhow::Context;
use p2p_audio::relay::RelayServer;
use p2p_audio::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    p2p_audio::init_tracing();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    let server = RelayServer::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay to {}", config.bind_addr))?;

    tokio::select! {
        result = server.run() => result.context("relay stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down relay"),
    }

    Ok(())
}
