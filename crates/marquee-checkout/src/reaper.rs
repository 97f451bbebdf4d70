//! # Lease Reaper
//!
//! Background task that deletes expired seat leases across tenants.
//!
//! Reaping is housekeeping only: an expired lease already stops blocking
//! other holders the instant it expires. The reaper keeps the lease table
//! small and the seat map honest for clients that read it directly.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every reap_interval_secs:                                              │
//! │     tenants_with_expired(now) ──► for each tenant: reap(tenant)         │
//! │                                                                         │
//! │  LeaseReaperHandle::shutdown() ──► loop exits after the current pass    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use marquee_core::Clock;
use marquee_db::Database;

use crate::error::{CheckoutError, CheckoutResult};
use crate::leases::SeatLeaseManager;

pub struct LeaseReaper {
    db: Database,
    leases: SeatLeaseManager,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running [`LeaseReaper`].
#[derive(Clone)]
pub struct LeaseReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl LeaseReaperHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> CheckoutResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| CheckoutError::Internal("Reaper shutdown channel closed".into()))
    }
}

impl LeaseReaper {
    pub fn new(
        db: Database,
        leases: SeatLeaseManager,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> (Self, LeaseReaperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let reaper = LeaseReaper {
            db,
            leases,
            clock,
            interval,
            shutdown_rx,
        };

        (reaper, LeaseReaperHandle { shutdown_tx })
    }

    /// Runs the reap loop until shut down. Spawn it as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Lease reaper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reap_once().await {
                        error!(error = %e, "Lease reap pass failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Lease reaper shutting down");
                    break;
                }
            }
        }

        info!("Lease reaper stopped");
    }

    /// One pass over every tenant with expired leases. Returns how many
    /// leases were deleted.
    ///
    /// A failing tenant is logged and skipped so one bad tenant does not
    /// starve the rest.
    pub async fn reap_once(&self) -> CheckoutResult<u64> {
        let tenants = self.db.leases().tenants_with_expired(self.clock.now()).await?;
        if tenants.is_empty() {
            debug!("No expired leases");
            return Ok(0);
        }

        let mut total = 0;
        for tenant in &tenants {
            match self.leases.reap(tenant).await {
                Ok(reaped) => total += reaped,
                Err(e) => error!(tenant = %tenant, error = %e, "Failed to reap tenant"),
            }
        }

        info!(tenants = tenants.len(), reaped = total, "Expired leases reaped");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use marquee_core::{ManualClock, Session, SessionStatus};
    use marquee_db::DbConfig;

    use crate::config::LeaseSettings;
    use crate::retry::RetryPolicy;

    async fn setup() -> (LeaseReaper, LeaseReaperHandle, SeatLeaseManager, Arc<ManualClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let start = Utc.with_ymd_and_hms(2030, 2, 2, 20, 0, 0).unwrap();

        for tenant in ["t1", "t2"] {
            db.catalog()
                .insert_session(&Session {
                    id: "S1".into(),
                    tenant_id: tenant.into(),
                    room_id: "R1".into(),
                    title: "Late Show".into(),
                    starts_at: start + ChronoDuration::hours(1),
                    ends_at: start + ChronoDuration::hours(3),
                    status: SessionStatus::Scheduled,
                })
                .await
                .unwrap();
            db.catalog().insert_seats(tenant, "R1", &["A1", "A2"]).await.unwrap();
        }

        let clock = Arc::new(ManualClock::new(start));
        let leases = SeatLeaseManager::new(db.clone(), clock.clone(), RetryPolicy::default(), LeaseSettings::default());
        let (reaper, handle) = LeaseReaper::new(db, leases.clone(), clock.clone(), Duration::from_secs(30));
        (reaper, handle, leases, clock)
    }

    #[tokio::test]
    async fn test_reap_once_covers_every_tenant() {
        let (reaper, _handle, leases, clock) = setup().await;
        let seats = vec!["A1".to_string(), "A2".to_string()];
        leases.reserve("t1", "S1", &seats, "T1", Some(60)).await.unwrap();
        leases.reserve("t2", "S1", &seats[..1], "T9", Some(60)).await.unwrap();
        leases.reserve("t2", "S1", &seats[1..], "T8", Some(600)).await.unwrap();

        assert_eq!(reaper.reap_once().await.unwrap(), 0);

        clock.advance(ChronoDuration::seconds(61));
        assert_eq!(reaper.reap_once().await.unwrap(), 3);
        assert_eq!(leases.leases_for("t2", "T8").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let (reaper, handle, _, _) = setup().await;
        let task = tokio::spawn(reaper.run());

        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
