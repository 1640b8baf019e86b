//! # halo-daemon
//!
//! Headless runner for the halo proximity beacon.
//!
//! The daemon loads configuration, starts one beacon engine over the host's
//! BlueZ adapter — broadcasting the local identity and detecting peers at
//! the same time — and logs every report cycle until it receives Ctrl-C.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package halo-daemon
//!
//! # Production
//! HALO_ENV=production HALO_CONFIG=/etc/halo/config.toml ./halo-daemon
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use halo_core::transport::bluez::BluezLink;
use halo_core::{BeaconConfig, BeaconDelegate, BeaconEngine, LogicalIdentity, PeerEstimate};
use tracing::{debug, info};

mod logging;

/// Forwards every engine callback into the log stream.
struct LogDelegate;

impl BeaconDelegate for LogDelegate {
    fn devices_updated(&mut self, devices: &BTreeMap<LogicalIdentity, PeerEstimate>) {
        if devices.is_empty() {
            debug!("no peers resolved yet");
            return;
        }
        for (identity, estimate) in devices {
            info!(peer = %identity, value = estimate.value, range = %estimate.range, "peer report");
        }
    }

    fn radio_availability_changed(&mut self, enabled: bool) {
        info!(enabled, "bluetooth availability changed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("HALO_ENV").is_ok_and(|env| env == "production");
    logging::init(is_production)?;

    let config_path =
        std::env::var("HALO_CONFIG").map_or_else(|_| BeaconConfig::default_path(), PathBuf::from);
    let config = BeaconConfig::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let identity = config.identity.clone().map_or_else(
        || LogicalIdentity::new(uuid::Uuid::new_v4().to_string()),
        LogicalIdentity::new,
    );
    info!(%identity, "starting halo daemon");

    let engine = BeaconEngine::spawn(identity, config, BluezLink::new());
    engine.set_delegate(LogDelegate);
    engine.start_broadcasting();
    engine.start_detecting();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("shutting down");
    engine.stop_detecting();
    engine.stop_broadcasting();
    engine.shutdown().await;

    Ok(())
}
