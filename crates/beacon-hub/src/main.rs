//! # beacon-hub
//!
//! Daemon for the beacon presence detection system.
//!
//! This binary provides:
//! - The periodic discovery/presence loop over the BlueZ radio
//! - Serialized per-device connect updates
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package beacon-hub
//!
//! # Production (on the hub)
//! ./beacon-hub
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use tracing::info;

mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("BEACON_ENV")
        .map(|v| v == "production")
        .unwrap_or(cfg!(target_os = "linux"));
    logging::init(is_production)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting beacon-hub");

    run().await
}

#[cfg(feature = "bluetooth")]
async fn run() -> anyhow::Result<()> {
    use std::sync::Arc;

    use beacon_core::{
        BeaconSettings, BlueZRadio, ConnectSequencer, FileRegistry, PresenceTracker,
        ScanScheduler, SettingsHandle, TracingTrigger,
    };

    let settings = SettingsHandle::open(BeaconSettings::default_path()?)?;
    let registry = FileRegistry::default_location()?;
    let radio = Arc::new(BlueZRadio::new().await?);

    let tracker = PresenceTracker::from_settings(&settings.current());
    let mut scheduler = ScanScheduler::new(Arc::clone(&radio), tracker, settings.subscribe());
    let sequencer = ConnectSequencer::new(radio, settings.subscribe());
    let trigger = TracingTrigger::new();

    info!(
        interval_secs = settings.current().update_interval_secs,
        timeout_ms = settings.current().timeout_ms,
        "presence loop starting"
    );

    tokio::select! {
        () = scheduler.run(&sequencer, &registry, &trigger) => {
            info!("timeout mode disabled; presence loop stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    Ok(())
}

#[cfg(not(feature = "bluetooth"))]
async fn run() -> anyhow::Result<()> {
    anyhow::bail!("beacon-hub was built without the `bluetooth` feature")
}
