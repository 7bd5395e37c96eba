use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::notifier::Notifier;
use crate::services::monitor::MonitoringService;
use crate::services::report::{ReportMode, ReportingService};

/// Runs poll-then-report cycles on a fixed interval. Every cycle is an
/// ordinary invocation of the same idempotent services, so a failed tick is
/// simply retried by the next one.
pub struct PollScheduler {
    monitor: MonitoringService,
    reporter: ReportingService,
    interval: Duration,
    mode: ReportMode,
}

impl PollScheduler {
    pub fn new(
        db: SqlitePool,
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        interval_secs: u64,
        mode: ReportMode,
    ) -> Self {
        Self {
            monitor: MonitoringService::new(db.clone(), config),
            reporter: ReportingService::new(db, notifier),
            interval: Duration::from_secs(interval_secs),
            mode,
        }
    }

    pub async fn start(self) {
        info!("starting scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.run_once().await {
                Ok(()) => info!("scheduled cycle completed"),
                Err(e) => {
                    // Errors do not stop the loop; the next tick retries.
                    warn!("scheduled cycle failed: {e}");
                }
            }
        }
    }

    async fn run_once(&self) -> Result<(), crate::error::AppError> {
        let outcome = self.monitor.poll_live().await?;
        info!(
            "polled snapshot {} ({} courses, {} sections)",
            outcome.snapshot_id, outcome.courses, outcome.sections
        );

        self.reporter.run_cycle(self.mode, false).await?;
        Ok(())
    }
}
