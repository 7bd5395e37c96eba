use std::collections::BTreeSet;
use std::path::Path;

use sqlx::SqlitePool;
use tracing::info;

use crate::config::AppConfig;
use crate::db::repository;
use crate::error::AppError;
use crate::source::{read_observation_file, FeedDownloader};

pub struct MonitoringService {
    db: SqlitePool,
    config: AppConfig,
}

#[derive(Debug)]
pub struct PollOutcome {
    pub snapshot_id: i64,
    pub semester: String,
    pub timestamp: String,
    pub courses: usize,
    pub sections: usize,
    pub overall_fill: f64,
}

impl MonitoringService {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        Self { db, config }
    }

    /// Download the live feed and ingest it as one snapshot.
    pub async fn poll_live(&self) -> Result<PollOutcome, AppError> {
        let url = self
            .config
            .feed_url
            .clone()
            .ok_or_else(|| AppError::Config("COURSEWATCH_FEED_URL is not set".to_string()))?;

        let downloader = FeedDownloader::new(
            url,
            self.config.data_dir.join("raw"),
            self.config.http_timeout_secs,
        )?;
        let path = downloader.download().await?;
        self.poll_from_file(&path).await
    }

    /// Ingest a previously captured feed file.
    pub async fn poll_from_file(&self, path: &Path) -> Result<PollOutcome, AppError> {
        info!("processing feed file {}", path.display());

        let batch = read_observation_file(path).await?.into_batch();
        let courses: BTreeSet<&str> = batch
            .records
            .iter()
            .map(|r| r.course_code.as_str())
            .collect();
        let outcome = PollOutcome {
            snapshot_id: 0,
            semester: batch.semester.clone(),
            timestamp: batch.timestamp.clone(),
            courses: courses.len(),
            sections: batch.records.len(),
            overall_fill: batch.overall_fill(),
        };

        let snapshot_id = repository::ingest_snapshot(&self.db, &batch).await?;
        Ok(PollOutcome {
            snapshot_id,
            ..outcome
        })
    }
}
