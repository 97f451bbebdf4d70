//! # Marquee Checkout Daemon
//!
//! Opens the shared checkout store, applies migrations, and reaps expired
//! seat leases until told to stop.
//!
//! ## Usage
//! ```bash
//! # Config from the platform config dir, overridable with MARQUEE_* vars
//! checkout-daemon
//!
//! # Explicit config file
//! checkout-daemon --config ./checkout.toml
//! ```
//!
//! Expired leases never block a reservation whether or not this process is
//! running; it keeps the lease table from growing without bound.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use marquee_checkout::config::CheckoutConfig;
use marquee_checkout::reaper::LeaseReaper;
use marquee_checkout::retry::RetryPolicy;
use marquee_checkout::{telemetry, SeatLeaseManager};
use marquee_core::{Clock, SystemClock};
use marquee_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CheckoutConfig::load(config_path_arg()).context("Failed to load checkout config")?;
    telemetry::init(&config.logging).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        reap_interval_secs = config.leases.reap_interval_secs,
        "Checkout daemon starting"
    );

    let db = Database::new(config.db_config()?)
        .await
        .context("Failed to open checkout database")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let leases = SeatLeaseManager::new(
        db.clone(),
        clock.clone(),
        RetryPolicy::new(&config.retry),
        config.leases.clone(),
    );

    let (reaper, handle) = LeaseReaper::new(db.clone(), leases, clock, config.reap_interval());
    let reaper_task = tokio::spawn(reaper.run());

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Failed to signal lease reaper");
    }
    if let Err(e) = reaper_task.await {
        error!(error = %e, "Lease reaper task panicked");
    }

    db.close().await;
    info!("Checkout daemon stopped");
    Ok(())
}

/// `--config <path>`, if given.
fn config_path_arg() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping lease reaper...");
}
