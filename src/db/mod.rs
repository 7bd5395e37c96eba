pub mod repository;

use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::error::AppError;

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Config(format!("failed to apply migrations: {e}")))
}

/// File-level copy of the store into `dest_dir`, stamped with the copy time.
pub async fn backup_file(db_path: &Path, dest_dir: &Path) -> Result<PathBuf, AppError> {
    if !db_path.exists() {
        return Err(AppError::NotFound(format!(
            "store file {} does not exist",
            db_path.display()
        )));
    }

    tokio::fs::create_dir_all(dest_dir).await?;

    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("coursewatch");
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let dest = dest_dir.join(format!("{stem}_{stamp}.db"));

    tokio::fs::copy(db_path, &dest).await?;
    info!("backed up {} to {}", db_path.display(), dest.display());
    Ok(dest)
}
