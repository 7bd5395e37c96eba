use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{SectionObservation, SnapshotBatch};

/// Legacy snapshot file layout: one JSON document per capture, courses keyed
/// by code, sections keyed by section code.
#[derive(Debug, Deserialize)]
pub struct LegacySnapshotFile {
    pub timestamp: String,
    pub semester: String,
    #[allow(dead_code)]
    pub overall_fill: f64,
    pub courses: BTreeMap<String, LegacyCourse>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyCourse {
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub sections: BTreeMap<String, LegacySection>,
}

#[derive(Debug, Deserialize)]
pub struct LegacySection {
    #[serde(default)]
    pub section_type: Option<String>,
    pub enrollment: i64,
    pub capacity: i64,
}

impl LegacySnapshotFile {
    fn into_batch(self) -> SnapshotBatch {
        let mut records = Vec::new();
        for (course_code, course) in self.courses {
            for (section_code, section) in course.sections {
                records.push(SectionObservation {
                    course_code: course_code.clone(),
                    course_title: course.course_title.clone(),
                    section_code,
                    section_type: section.section_type,
                    instructor: None,
                    enrollment: section.enrollment,
                    capacity: section.capacity,
                });
            }
        }
        SnapshotBatch {
            timestamp: self.timestamp,
            semester: self.semester,
            records,
        }
    }
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

fn find_snapshot_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !dir.exists() {
        warn!("legacy data directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();

    // Filename order is chronological for the legacy naming scheme.
    files.sort();
    Ok(files)
}

async fn load_snapshot_file(path: &Path) -> Result<LegacySnapshotFile, AppError> {
    let text = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::Validation(format!("malformed snapshot file {}: {e}", path.display()))
    })
}

/// Replay every legacy JSON snapshot in `dir` through the ingestor. Files
/// whose timestamp already exists are skipped, so re-running is a no-op.
/// One bad file is recorded as a failure without aborting the rest.
pub async fn migrate_dir(
    db: &SqlitePool,
    dir: &Path,
    dry_run: bool,
    force: bool,
) -> Result<MigrationReport, AppError> {
    let files = find_snapshot_files(dir)?;
    let mut report = MigrationReport {
        total: files.len(),
        ..MigrationReport::default()
    };

    if files.is_empty() {
        info!("no legacy snapshot files found in {}", dir.display());
        return Ok(report);
    }

    info!(
        "migrating {} legacy snapshot files (dry_run={dry_run})",
        files.len()
    );

    for path in files {
        let outcome = migrate_file(db, &path, dry_run, force).await;
        match outcome {
            Ok(FileOutcome::Migrated) => report.migrated += 1,
            Ok(FileOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!("failed to migrate {}: {e}", path.display());
                report.failed += 1;
                report.failures.push((path, e.to_string()));
            }
        }
    }

    info!(
        "migration complete: {} migrated, {} skipped, {} failed",
        report.migrated, report.skipped, report.failed
    );
    Ok(report)
}

enum FileOutcome {
    Migrated,
    Skipped,
}

async fn migrate_file(
    db: &SqlitePool,
    path: &Path,
    dry_run: bool,
    force: bool,
) -> Result<FileOutcome, AppError> {
    let snapshot = load_snapshot_file(path).await?;

    if !force && repository::snapshot_exists(db, &snapshot.timestamp).await? {
        info!(
            "snapshot {} already exists, skipping {}",
            snapshot.timestamp,
            path.display()
        );
        return Ok(FileOutcome::Skipped);
    }

    let batch = snapshot.into_batch();
    if dry_run {
        batch.validate()?;
        info!("would migrate {}", path.display());
        return Ok(FileOutcome::Migrated);
    }

    repository::ingest_snapshot(db, &batch).await?;
    info!("migrated {}", path.display());
    Ok(FileOutcome::Migrated)
}
