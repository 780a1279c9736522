//! Background service that expires old artifacts.
//!
//! Each sweep asks the registry for artifacts older than the retention window
//! and deletes them one at a time, so the registry lock is never held across
//! more than a single delete.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ffbox_storage::ArtifactRegistry;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::metrics;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// Periodic artifact expiry.
pub struct CleanupScheduler {
    registry: Arc<ArtifactRegistry>,
    interval: Duration,
    retention: chrono::Duration,
}

impl CleanupScheduler {
    pub fn new(
        registry: Arc<ArtifactRegistry>,
        interval: Duration,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            registry,
            interval,
            retention,
        }
    }

    /// Start the background sweep loop. The first sweep runs immediately.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        info!(
            "Starting cleanup scheduler (interval: {:?}, retention: {}h)",
            self.interval,
            self.retention.num_minutes() as f64 / 60.0
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// Run a single sweep against the current time.
    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run a single sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = self.registry.list_expired(now, self.retention).await;
        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };

        for filename in expired {
            match self.registry.delete(&filename).await {
                Ok(true) => {
                    report.deleted += 1;
                    debug!(filename = %filename, "Expired artifact deleted");
                }
                // Removed concurrently, e.g. by an auto-delete download
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(filename = %filename, error = %e, "Failed to delete expired artifact");
                }
            }
        }

        metrics::record_cleanup_sweep(report.deleted, report.errors);
        if report.expired > 0 {
            info!(
                deleted = report.deleted,
                errors = report.errors,
                "Cleanup sweep complete"
            );
        }
        report
    }
}
