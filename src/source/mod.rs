use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{SectionObservation, SnapshotBatch};

/// On-disk shape of one feed capture: a semester label, an optional capture
/// timestamp, and the normalized section records.
#[derive(Debug, Deserialize)]
pub struct ObservationFile {
    pub semester: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub records: Vec<SectionObservation>,
}

impl ObservationFile {
    /// Convert into an ingestible batch, stamping the capture time when the
    /// file does not carry one.
    pub fn into_batch(self) -> SnapshotBatch {
        SnapshotBatch {
            timestamp: self
                .timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            semester: self.semester,
            records: self.records,
        }
    }
}

pub async fn read_observation_file(path: &Path) -> Result<ObservationFile, AppError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Validation(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::Validation(format!("malformed feed file {}: {e}", path.display())))
}

/// Downloads the registrar feed and keeps the raw bytes on disk for
/// later replay.
pub struct FeedDownloader {
    client: Client,
    url: String,
    raw_dir: PathBuf,
}

impl FeedDownloader {
    pub fn new(url: String, raw_dir: PathBuf, timeout_secs: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url,
            raw_dir,
        })
    }

    /// Fetch the feed to a uniquely named raw file. Network failures are
    /// `Transport` and leave nothing behind.
    pub async fn download(&self) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.raw_dir).await?;

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "feed download failed with status {}",
                response.status()
            )));
        }
        let body = response.bytes().await?;

        // Uuid suffix keeps concurrent downloads from clobbering each other.
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let uuid = Uuid::new_v4().simple().to_string();
        let path = self
            .raw_dir
            .join(format!("feed_{stamp}_{}.json", &uuid[..8]));

        tokio::fs::write(&path, &body).await?;
        info!("downloaded feed to {}", path.display());
        Ok(path)
    }
}
