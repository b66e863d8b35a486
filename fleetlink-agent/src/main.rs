//! Fleetlink Agent - device-side resource reporting
//!
//! Wires the pieces together: configuration, device identity, the WebSocket
//! connector and the session state machine, plus the ctrl-c shutdown signal.

use anyhow::{Context, Result};
use fleetlink_agent::config::AgentConfig;
use fleetlink_agent::identity::DeviceIdentity;
use fleetlink_agent::metrics::{network, MetricsConfig, SystemSampler};
use fleetlink_agent::session::Session;
use fleetlink_agent::transport::WsConnector;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleetlink_agent=info")),
        )
        .init();

    info!("Fleetlink agent v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load()
        .await
        .context("failed to load agent configuration")?;

    let identity = DeviceIdentity::establish(config.agent.device_id.clone());

    // An endpoint that can never yield a transport is fatal; everything past
    // this point retries forever instead of exiting.
    let connector = WsConnector::new(config.coordinator.url.clone())
        .context("coordinator endpoint is unusable, refusing to start")?;

    let metrics_config = MetricsConfig {
        storage_path: config.metrics.storage_path.clone(),
        probe_addr: config
            .metrics
            .probe_addr
            .clone()
            .or_else(|| network::coordinator_probe_addr(&config.coordinator.url)),
    };
    let sampler = SystemSampler::new(identity.clone(), metrics_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let session = Session::new(&config.session, identity, connector, sampler);
    let summary = session.run(shutdown_rx).await;

    info!(
        heartbeats = summary.heartbeats_sent,
        last_ack_seq = ?summary.last_ack_seq,
        "agent stopped"
    );
    Ok(())
}
