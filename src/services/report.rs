use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::diff::diff;
use crate::error::AppError;
use crate::notifier::Notifier;
use crate::report::format_changes_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Deliver only when the change-set is non-empty; empty cycles still log
    /// `changes_found = false` so quiet ticks stay quiet.
    Stateful,
    /// Deliver whenever an unreported snapshot exists, changes or not.
    Always,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Store holds no snapshots at all.
    NoSnapshots,
    /// The latest snapshot already has a report-log entry.
    AlreadyReported,
    /// Dry run: the report was computed but neither delivered nor logged.
    DryRun { changes_found: bool },
    /// A concurrent invocation logged this snapshot first.
    LostRace,
    /// The cycle completed and the log entry was written.
    Completed {
        changes_found: bool,
        delivered: bool,
    },
}

pub struct ReportingService {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl ReportingService {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// One reporting cycle. Safe to re-invoke at any time: delivery failures
    /// leave the pending snapshot unlogged, so the next cycle recomputes the
    /// identical diff and retries. The report-log insert is the only step
    /// that closes the window, and it is race-safe.
    pub async fn run_cycle(
        &self,
        mode: ReportMode,
        dry_run: bool,
    ) -> Result<CycleOutcome, AppError> {
        let Some(latest_id) = repository::latest_snapshot_id(&self.db).await? else {
            info!("no snapshots in the store; nothing to report");
            return Ok(CycleOutcome::NoSnapshots);
        };
        let last_reported_id = repository::last_reported_snapshot_id(&self.db).await?;

        if last_reported_id == Some(latest_id) {
            info!("latest snapshot {latest_id} has already been reported");
            return Ok(CycleOutcome::AlreadyReported);
        }

        let current = repository::snapshot_data(&self.db, latest_id).await?;
        let baseline = match last_reported_id {
            Some(id) => Some(repository::snapshot_data(&self.db, id).await?),
            None => None,
        };

        let changes = diff(baseline.as_ref(), &current);
        let changes_found = !changes.is_empty();

        let deliver = match mode {
            ReportMode::Stateful => changes_found,
            ReportMode::Always => true,
        };

        if dry_run {
            info!(
                "dry run: would {} for snapshot {latest_id} (changes_found={changes_found})",
                if deliver { "deliver" } else { "skip delivery" }
            );
            return Ok(CycleOutcome::DryRun { changes_found });
        }

        if deliver {
            // Delivery happens outside any transaction; only a confirmed
            // send may be followed by the log insert.
            let report = format_changes_report(&changes, &current);
            self.notifier.send_report(&report).await?;
        } else {
            info!("no changes between snapshots; skipping delivery");
        }

        if repository::try_log_report(&self.db, latest_id, changes_found).await? {
            Ok(CycleOutcome::Completed {
                changes_found,
                delivered: deliver,
            })
        } else {
            warn!("snapshot {latest_id} was logged by a concurrent reporter; treating as done");
            Ok(CycleOutcome::LostRace)
        }
    }
}
