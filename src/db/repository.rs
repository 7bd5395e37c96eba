use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{
    department_of, CourseState, SectionState, SectionType, SnapshotBatch, SnapshotData, Status,
};

/// Store a complete enrollment snapshot atomically: the snapshot row, course
/// and section dimension upserts, and one enrollment row per observation all
/// commit together or not at all. A duplicate capture timestamp aborts the
/// whole transaction with `Conflict`.
pub async fn ingest_snapshot(db: &SqlitePool, batch: &SnapshotBatch) -> Result<i64, AppError> {
    batch.validate()?;

    let now = Utc::now().to_rfc3339();
    let overall_fill = batch.overall_fill();

    let mut tx = db.begin().await?;

    let snapshot_id = sqlx::query(
        "INSERT INTO snapshots (timestamp, semester, overall_fill) VALUES (?1, ?2, ?3)",
    )
    .bind(&batch.timestamp)
    .bind(&batch.semester)
    .bind(overall_fill)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_db(e, &format!("snapshot {}", batch.timestamp)))?
    .last_insert_rowid();

    // Dimension upserts: one pass per distinct course, then per section.
    let mut course_ids: BTreeMap<&str, i64> = BTreeMap::new();
    for record in &batch.records {
        if course_ids.contains_key(record.course_code.as_str()) {
            continue;
        }
        let course_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO courses (course_code, course_title, department, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(course_code) DO UPDATE SET
                course_title = COALESCE(excluded.course_title, course_title),
                department = COALESCE(excluded.department, department),
                updated_at = excluded.updated_at
            RETURNING course_id
            "#,
        )
        .bind(&record.course_code)
        .bind(record.course_title.as_deref().map(str::trim))
        .bind(department_of(&record.course_code))
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_db(e, &format!("course {}", record.course_code)))?;

        course_ids.insert(record.course_code.as_str(), course_id);
    }

    for record in &batch.records {
        let course_id = course_ids[record.course_code.as_str()];
        let section_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sections (course_id, section_code, section_type, instructor, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(course_id, section_code) DO UPDATE SET
                section_type = excluded.section_type,
                instructor = COALESCE(excluded.instructor, instructor),
                updated_at = excluded.updated_at
            RETURNING section_id
            "#,
        )
        .bind(course_id)
        .bind(&record.section_code)
        .bind(record.section_type().as_code())
        .bind(&record.instructor)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_db(
                e,
                &format!("section {} {}", record.course_code, record.section_code),
            )
        })?;

        let fill = record.fill();
        let status = Status::classify(fill);
        sqlx::query(
            r#"
            INSERT INTO enrollment_data
                (snapshot_id, section_id, status, enrollment_count, capacity_count, fill_percentage)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(snapshot_id)
        .bind(section_id)
        .bind(status.as_str())
        .bind(record.enrollment)
        .bind(record.capacity)
        .bind(fill)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_db(
                e,
                &format!("enrollment for {} {}", record.course_code, record.section_code),
            )
        })?;
    }

    tx.commit().await?;

    info!(
        "stored snapshot {} ({} records, overall fill {:.2})",
        snapshot_id,
        batch.records.len(),
        overall_fill
    );
    Ok(snapshot_id)
}

pub async fn latest_snapshot_id(db: &SqlitePool) -> Result<Option<i64>, AppError> {
    let id = sqlx::query_scalar(
        "SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT 1",
    )
    .fetch_optional(db)
    .await?;
    Ok(id)
}

pub async fn last_reported_snapshot_id(db: &SqlitePool) -> Result<Option<i64>, AppError> {
    let id = sqlx::query_scalar(
        "SELECT reported_snapshot_id FROM reporting_log ORDER BY report_timestamp DESC LIMIT 1",
    )
    .fetch_optional(db)
    .await?;
    Ok(id)
}

pub async fn last_report_time(db: &SqlitePool) -> Result<Option<String>, AppError> {
    let ts = sqlx::query_scalar(
        "SELECT report_timestamp FROM reporting_log ORDER BY report_timestamp DESC LIMIT 1",
    )
    .fetch_optional(db)
    .await?;
    Ok(ts)
}

pub async fn snapshot_exists(db: &SqlitePool, timestamp: &str) -> Result<bool, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE timestamp = ?1")
        .bind(timestamp)
        .fetch_one(db)
        .await?;
    Ok(count > 0)
}

/// Close the reporting window for a snapshot. Returns `false` when another
/// invocation already logged it; the unique index on `reported_snapshot_id`
/// is what resolves the race.
pub async fn try_log_report(
    db: &SqlitePool,
    snapshot_id: i64,
    changes_found: bool,
) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO reporting_log (reported_snapshot_id, report_timestamp, changes_found) VALUES (?1, ?2, ?3)",
    )
    .bind(snapshot_id)
    .bind(&now)
    .bind(changes_found)
    .execute(db)
    .await;

    match result {
        Ok(_) => {
            info!("logged report for snapshot {snapshot_id} (changes_found={changes_found})");
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            debug!("snapshot {snapshot_id} already logged by a concurrent run");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, FromRow)]
struct SnapshotMetaRow {
    snapshot_id: i64,
    timestamp: String,
    semester: String,
    overall_fill: f64,
}

#[derive(Debug, FromRow)]
struct EnrollmentJoinRow {
    course_code: String,
    course_title: Option<String>,
    department: Option<String>,
    section_code: String,
    section_type: Option<String>,
    instructor: Option<String>,
    status: String,
    enrollment_count: i64,
    capacity_count: i64,
    fill_percentage: f64,
}

/// Reconstruct the full course/section view of one snapshot.
pub async fn snapshot_data(db: &SqlitePool, snapshot_id: i64) -> Result<SnapshotData, AppError> {
    let meta: SnapshotMetaRow = sqlx::query_as(
        "SELECT snapshot_id, timestamp, semester, overall_fill FROM snapshots WHERE snapshot_id = ?1",
    )
    .bind(snapshot_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("snapshot {snapshot_id}")))?;

    let rows: Vec<EnrollmentJoinRow> = sqlx::query_as(
        r#"
        SELECT
            c.course_code,
            c.course_title,
            c.department,
            s.section_code,
            s.section_type,
            s.instructor,
            ed.status,
            ed.enrollment_count,
            ed.capacity_count,
            ed.fill_percentage
        FROM enrollment_data ed
        JOIN sections s ON ed.section_id = s.section_id
        JOIN courses c ON s.course_id = c.course_id
        WHERE ed.snapshot_id = ?1
        ORDER BY c.course_code, s.section_code
        "#,
    )
    .bind(snapshot_id)
    .fetch_all(db)
    .await?;

    let mut courses: BTreeMap<String, CourseState> = BTreeMap::new();
    for row in rows {
        let course = courses
            .entry(row.course_code.clone())
            .or_insert_with(|| CourseState {
                course_code: row.course_code.clone(),
                course_title: row.course_title.clone().map(|t| t.trim().to_string()),
                department: row
                    .department
                    .clone()
                    .unwrap_or_else(|| department_of(&row.course_code)),
                average_fill: 0.0,
                sections: BTreeMap::new(),
            });

        let section_type = row
            .section_type
            .as_deref()
            .map(SectionType::from_code)
            .unwrap_or_else(|| SectionType::from_section_code(&row.section_code));

        course.sections.insert(
            row.section_code.clone(),
            SectionState {
                section_code: row.section_code,
                section_type,
                instructor: row.instructor,
                enrollment: row.enrollment_count,
                capacity: row.capacity_count,
                fill: row.fill_percentage,
                status: Status::parse(&row.status)?,
            },
        );
    }

    for course in courses.values_mut() {
        course.recompute_average_fill();
    }

    Ok(SnapshotData {
        snapshot_id: meta.snapshot_id,
        timestamp: meta.timestamp,
        semester: meta.semester,
        overall_fill: meta.overall_fill,
        courses,
    })
}

/// One section's state in one snapshot, joined with dimension data. Backs
/// the dashboard history series.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub snapshot_id: i64,
    pub timestamp: String,
    pub course_code: String,
    pub course_title: Option<String>,
    pub department: Option<String>,
    pub section_id: i64,
    pub section_code: String,
    pub section_type: Option<String>,
    pub instructor: Option<String>,
    pub enrollment_count: i64,
    pub capacity_count: i64,
    pub fill_percentage: f64,
}

const HISTORY_SELECT: &str = r#"
    SELECT
        sn.snapshot_id,
        sn.timestamp,
        c.course_code,
        c.course_title,
        c.department,
        s.section_id,
        s.section_code,
        s.section_type,
        s.instructor,
        ed.enrollment_count,
        ed.capacity_count,
        ed.fill_percentage
    FROM enrollment_data ed
    JOIN snapshots sn ON ed.snapshot_id = sn.snapshot_id
    JOIN sections s ON ed.section_id = s.section_id
    JOIN courses c ON s.course_id = c.course_id
"#;

/// Chronological history of every section in a semester, one row per
/// (snapshot, section) pair.
pub async fn enrollment_history(
    db: &SqlitePool,
    semester: &str,
) -> Result<Vec<HistoryRow>, AppError> {
    let query = format!(
        "{HISTORY_SELECT} WHERE sn.semester = ?1 ORDER BY sn.timestamp ASC, c.course_code, s.section_code"
    );
    let rows = sqlx::query_as(&query).bind(semester).fetch_all(db).await?;
    Ok(rows)
}

/// Chronological history of a single section across all snapshots.
pub async fn section_history(
    db: &SqlitePool,
    section_id: i64,
) -> Result<Vec<HistoryRow>, AppError> {
    let query = format!("{HISTORY_SELECT} WHERE s.section_id = ?1 ORDER BY sn.timestamp ASC");
    let rows = sqlx::query_as(&query).bind(section_id).fetch_all(db).await?;
    Ok(rows)
}

/// Snapshot ids and timestamps in chronological order, optionally scoped to
/// one semester.
pub async fn list_snapshots(
    db: &SqlitePool,
    semester: Option<&str>,
) -> Result<Vec<(i64, String)>, AppError> {
    let rows = match semester {
        Some(semester) => {
            sqlx::query_as(
                "SELECT snapshot_id, timestamp FROM snapshots WHERE semester = ?1 ORDER BY timestamp ASC",
            )
            .bind(semester)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as("SELECT snapshot_id, timestamp FROM snapshots ORDER BY timestamp ASC")
                .fetch_all(db)
                .await?
        }
    };
    Ok(rows)
}

/// Distinct semester labels, most recently observed first.
pub async fn semesters(db: &SqlitePool) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query_scalar(
        "SELECT semester FROM snapshots GROUP BY semester ORDER BY MAX(timestamp) DESC",
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Delete all but the `keep` most recent snapshots, cascading to their
/// enrollment rows and report-log entries. Dimension rows survive. Refuses
/// to delete a snapshot whose report has not gone out yet.
pub async fn cleanup_snapshots(db: &SqlitePool, keep: i64) -> Result<u64, AppError> {
    if keep < 0 {
        return Err(AppError::Validation("keep count must be >= 0".to_string()));
    }

    let mut tx = db.begin().await?;

    let doomed: Vec<i64> = sqlx::query_scalar(
        "SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT -1 OFFSET ?1",
    )
    .bind(keep)
    .fetch_all(&mut *tx)
    .await?;

    if doomed.is_empty() {
        return Ok(0);
    }

    let latest: Option<i64> =
        sqlx::query_scalar("SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let last_reported: Option<i64> = sqlx::query_scalar(
        "SELECT reported_snapshot_id FROM reporting_log ORDER BY report_timestamp DESC LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(latest_id) = latest {
        let pending = last_reported != Some(latest_id);
        if pending && doomed.contains(&latest_id) {
            warn!(
                "cleanup would delete snapshot {latest_id}, which has not been reported yet; skipping"
            );
            return Ok(0);
        }
    }

    sqlx::query(
        r#"
        DELETE FROM enrollment_data WHERE snapshot_id IN
            (SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT -1 OFFSET ?1)
        "#,
    )
    .bind(keep)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM reporting_log WHERE reported_snapshot_id IN
            (SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT -1 OFFSET ?1)
        "#,
    )
    .bind(keep)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM snapshots WHERE snapshot_id IN
            (SELECT snapshot_id FROM snapshots ORDER BY timestamp DESC LIMIT -1 OFFSET ?1)
        "#,
    )
    .bind(keep)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("cleaned up {} old snapshots", doomed.len());
    Ok(doomed.len() as u64)
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub snapshots: i64,
    pub courses: i64,
    pub sections: i64,
    pub reports: i64,
    pub earliest_snapshot: Option<String>,
    pub latest_snapshot: Option<String>,
}

pub async fn database_stats(db: &SqlitePool) -> Result<StoreStats, AppError> {
    let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
        .fetch_one(db)
        .await?;
    let courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(db)
        .await?;
    let sections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
        .fetch_one(db)
        .await?;
    let reports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reporting_log")
        .fetch_one(db)
        .await?;
    let (earliest_snapshot, latest_snapshot): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM snapshots")
            .fetch_one(db)
            .await?;

    Ok(StoreStats {
        snapshots,
        courses,
        sections,
        reports,
        earliest_snapshot,
        latest_snapshot,
    })
}
