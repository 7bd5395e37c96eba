use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use coursewatch::db::{self, repository};
use coursewatch::error::AppError;
use coursewatch::models::{SectionObservation, SnapshotBatch};
use coursewatch::notifier::Notifier;
use coursewatch::services::{CycleOutcome, ReportMode, ReportingService};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

struct CountingNotifier {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingNotifier {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send_report(&self, _text: &str) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Transport("simulated delivery failure".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn setup() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to open test database");
    db::run_migrations(&pool).await.expect("migrations");
    (dir, pool)
}

async fn ingest(pool: &SqlitePool, timestamp: &str, enrollment: i64) -> i64 {
    let batch = SnapshotBatch {
        timestamp: timestamp.to_string(),
        semester: "Spring 2026".to_string(),
        records: vec![SectionObservation {
            course_code: "CSCI 101".to_string(),
            course_title: None,
            section_code: "1L".to_string(),
            section_type: None,
            instructor: None,
            enrollment,
            capacity: 30,
        }],
    };
    repository::ingest_snapshot(pool, &batch).await.expect("ingest")
}

async fn log_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM reporting_log")
        .fetch_one(pool)
        .await
        .expect("count")
}

#[tokio::test]
async fn first_cycle_reports_then_goes_quiet() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;

    let outcome = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("cycle");
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes_found: true,
            delivered: true
        }
    );
    assert_eq!(notifier.calls(), 1);

    // Nothing new: the snapshot is already logged.
    let outcome = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("cycle");
    assert_eq!(outcome, CycleOutcome::AlreadyReported);
    assert_eq!(notifier.calls(), 1);
    assert_eq!(log_count(&pool).await, 1);
}

#[tokio::test]
async fn stateful_mode_logs_but_skips_delivery_when_nothing_changed() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;
    reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("baseline cycle");
    let calls_after_baseline = notifier.calls();

    // Same numbers, new capture time: an empty change-set.
    ingest(&pool, "2026-02-01T11:00:00Z", 10).await;
    let outcome = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("cycle");
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes_found: false,
            delivered: false
        }
    );
    assert_eq!(notifier.calls(), calls_after_baseline);
    assert_eq!(log_count(&pool).await, 2);
}

#[tokio::test]
async fn always_mode_delivers_even_without_changes() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;
    reporter
        .run_cycle(ReportMode::Always, false)
        .await
        .expect("baseline cycle");

    ingest(&pool, "2026-02-01T11:00:00Z", 10).await;
    let outcome = reporter
        .run_cycle(ReportMode::Always, false)
        .await
        .expect("cycle");
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes_found: false,
            delivered: true
        }
    );
    assert_eq!(notifier.calls(), 2);
}

#[tokio::test]
async fn delivery_failure_keeps_the_window_open_for_retry() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;

    notifier.failing.store(true, Ordering::SeqCst);
    let err = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect_err("delivery failure must surface");
    assert!(matches!(err, AppError::Transport(_)));
    assert_eq!(log_count(&pool).await, 0);

    // The next invocation recomputes the same pending report and succeeds.
    notifier.failing.store(false, Ordering::SeqCst);
    let outcome = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("retry cycle");
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes_found: true,
            delivered: true
        }
    );
    assert_eq!(log_count(&pool).await, 1);
}

#[tokio::test]
async fn dry_run_neither_delivers_nor_logs() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;

    let outcome = reporter
        .run_cycle(ReportMode::Stateful, true)
        .await
        .expect("dry run");
    assert_eq!(outcome, CycleOutcome::DryRun { changes_found: true });
    assert_eq!(notifier.calls(), 0);
    assert_eq!(log_count(&pool).await, 0);
}

#[tokio::test]
async fn empty_store_is_a_no_op() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());
    let reporter = ReportingService::new(pool.clone(), notifier.clone());

    let outcome = reporter
        .run_cycle(ReportMode::Stateful, false)
        .await
        .expect("cycle");
    assert_eq!(outcome, CycleOutcome::NoSnapshots);
    assert_eq!(notifier.calls(), 0);
}

#[tokio::test]
async fn racing_reporters_log_exactly_once() {
    let (_dir, pool) = setup().await;
    let notifier = Arc::new(CountingNotifier::new());

    ingest(&pool, "2026-02-01T10:00:00Z", 10).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let reporter = ReportingService::new(pool.clone(), notifier.clone());
        handles.push(tokio::spawn(async move {
            reporter.run_cycle(ReportMode::Stateful, false).await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        match handle.await.expect("join").expect("cycle") {
            CycleOutcome::Completed { .. } => completed += 1,
            CycleOutcome::LostRace | CycleOutcome::AlreadyReported => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // Exactly one invocation owns the log entry; losers must detect the
    // conflict instead of double-logging.
    assert_eq!(completed, 1);
    assert_eq!(log_count(&pool).await, 1);
    assert!(notifier.calls() >= 1);
}
