//! purelink agent entry point.
//!
//! Loads the configuration, wires the connection manager to its
//! collaborators, and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()                 -- $PURELINK_CONFIG or platform dir
//!  └─ ConnectionManager::start()
//!       ├─ TokioScheduler           -- refresh and retry timers
//!       ├─ UdpDiscovery             -- address announcements on the LAN
//!       ├─ SimulatedClientFactory   -- one client per device
//!       └─ LogSink                  -- update notifications as log events
//!  └─ ctrl_c().await
//!  └─ ConnectionManager::shutdown()
//! ```
//!
//! The device wire protocol is not part of this workspace, so the binary
//! drives in-process simulated devices.  Swapping in a real
//! [`purelink_core::ClientFactory`] is the only change a deployment needs.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use purelink_agent::application::connection_manager::{Collaborators, ConnectionManager};
use purelink_agent::infrastructure::{
    network::discovery::UdpDiscovery,
    simulated::SimulatedClientFactory,
    sink::LogSink,
    storage::config::{config_file_path, load_config},
    timer::TokioScheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level)),
        )
        .with_thread_ids(true)
        .init();

    info!("purelink agent starting");
    if let Ok(path) = config_file_path() {
        info!("configuration: {}", path.display());
    }

    let records = config.device_records();
    if records.is_empty() {
        bail!("no devices configured; add [[devices]] entries with credentials");
    }

    // ── Collaborators ─────────────────────────────────────────────────────────
    let scheduler = TokioScheduler::from_current().context("no tokio runtime")?;
    let discovery = UdpDiscovery::new(config.discovery.port);
    warn!("device clients are simulated; no appliance traffic leaves this host");
    let collaborators = Collaborators {
        clients: Arc::new(SimulatedClientFactory::new()),
        discovery: Arc::new(discovery),
        sink: Arc::new(LogSink::new()),
        scheduler: Arc::new(scheduler),
    };

    // ── Manager ───────────────────────────────────────────────────────────────
    let (manager, failures) = ConnectionManager::start(
        records,
        config.host_overrides(),
        config.manager_settings(),
        collaborators,
    )
    .context("starting connection manager")?;

    for failure in &failures {
        error!("device not started: {failure}");
    }
    info!(
        "managing {} device(s); press Ctrl-C to stop",
        manager.devices().len()
    );

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown signal received");

    // Stopping discovery joins its receive thread.
    tokio::task::spawn_blocking(move || manager.shutdown()).await?;

    info!("purelink agent stopped");
    Ok(())
}
