use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursewatch::config::{AppConfig, TelegramConfig};
use coursewatch::db;
use coursewatch::error::AppError;
use coursewatch::export;
use coursewatch::migrate;
use coursewatch::notifier::{NoopNotifier, Notifier, TelegramNotifier};
use coursewatch::services::{
    CycleOutcome, MonitoringService, PollScheduler, ReportMode, ReportingService,
};
use coursewatch::state::AppState;
use coursewatch::web;

#[derive(Debug, Parser)]
#[command(name = "coursewatch")]
#[command(about = "University course-enrollment snapshot monitor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture one enrollment snapshot, from the live feed or a saved file
    Poll {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        debug: bool,
    },
    /// Run one reporting cycle against the latest snapshot
    Report {
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        no_telegram: bool,
        #[arg(long)]
        stateful: bool,
    },
    /// Poll, then report
    Run {
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        no_telegram: bool,
    },
    /// Run poll/report cycles on a timer until interrupted
    Schedule {
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        no_telegram: bool,
    },
    /// Serve the dashboard export over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
    /// Store maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Show row counts and the snapshot date range
    Stats,
    /// Delete all but the most recent snapshots
    Cleanup {
        #[arg(long, default_value_t = 50)]
        keep: i64,
    },
    /// Import legacy JSON snapshot files from the data directory
    Migrate {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
    /// Copy the store file aside
    Backup { dest: Option<PathBuf> },
}

fn wants_debug(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Poll { debug: true, .. }
            | Commands::Report { debug: true, .. }
            | Commands::Run { debug: true, .. }
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if wants_debug(&cli.command) {
        "coursewatch=debug"
    } else {
        "coursewatch=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = AppConfig::from_env();
    let pool = db::connect(&config.database_url).await?;

    match cli.command {
        Commands::Poll { file, .. } => {
            let monitor = MonitoringService::new(pool.clone(), config);
            let outcome = match file {
                Some(path) => monitor.poll_from_file(&path).await?,
                None => monitor.poll_live().await?,
            };
            println!(
                "stored snapshot {} for {} ({} courses, {} sections, overall fill {:.1}%)",
                outcome.snapshot_id,
                outcome.semester,
                outcome.courses,
                outcome.sections,
                outcome.overall_fill * 100.0
            );
        }
        Commands::Report {
            debug,
            no_telegram,
            stateful,
        } => {
            let mode = if stateful {
                ReportMode::Stateful
            } else {
                ReportMode::Always
            };
            let reporter = ReportingService::new(pool.clone(), build_notifier(no_telegram)?);
            print_cycle_outcome(reporter.run_cycle(mode, debug).await?);
        }
        Commands::Run { debug, no_telegram } => {
            let monitor = MonitoringService::new(pool.clone(), config);
            let outcome = monitor.poll_live().await?;
            println!(
                "stored snapshot {} for {}",
                outcome.snapshot_id, outcome.semester
            );

            let reporter = ReportingService::new(pool.clone(), build_notifier(no_telegram)?);
            print_cycle_outcome(reporter.run_cycle(ReportMode::Always, debug).await?);
        }
        Commands::Schedule {
            interval,
            no_telegram,
        } => {
            let interval = interval.unwrap_or(config.poll_interval_secs);
            let notifier = build_notifier(no_telegram)?;
            let scheduler = PollScheduler::new(
                pool.clone(),
                config,
                notifier,
                interval,
                ReportMode::Stateful,
            );
            scheduler.start().await;
        }
        Commands::Serve { addr } => {
            let milestones = export::load_milestones(&config.milestones_path)?;
            let state = AppState {
                db: pool.clone(),
                milestones: Arc::new(milestones),
            };
            let app = web::router(state);

            info!("listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .await
                .map_err(|e| AppError::Transport(e.to_string()))?;
        }
        Commands::Db { command } => match command {
            DbCommands::Stats => {
                let stats = db::repository::database_stats(&pool).await?;
                println!("snapshots: {}", stats.snapshots);
                println!("courses:   {}", stats.courses);
                println!("sections:  {}", stats.sections);
                println!("reports:   {}", stats.reports);
                println!(
                    "range:     {} to {}",
                    stats.earliest_snapshot.as_deref().unwrap_or("-"),
                    stats.latest_snapshot.as_deref().unwrap_or("-")
                );
            }
            DbCommands::Cleanup { keep } => {
                let deleted = db::repository::cleanup_snapshots(&pool, keep).await?;
                if deleted > 0 {
                    println!("deleted {deleted} old snapshots, kept the {keep} most recent");
                } else {
                    println!("nothing to clean up");
                }
            }
            DbCommands::Migrate { dry_run, force } => {
                let report = migrate::migrate_dir(&pool, &config.data_dir, dry_run, force).await?;
                println!(
                    "{} files: {} migrated, {} skipped, {} failed",
                    report.total, report.migrated, report.skipped, report.failed
                );
                for (path, reason) in &report.failures {
                    println!("  failed {}: {reason}", path.display());
                }
                if report.failed > 0 {
                    return Err(AppError::Validation(format!(
                        "{} files failed to migrate",
                        report.failed
                    )));
                }
            }
            DbCommands::Backup { dest } => {
                let db_path = config.database_file().ok_or_else(|| {
                    AppError::Config("store is not a file-backed sqlite database".to_string())
                })?;
                let dest_dir = dest.unwrap_or_else(|| config.data_dir.join("backups"));
                let copied = db::backup_file(&db_path, &dest_dir).await?;
                println!("backup written to {}", copied.display());
            }
        },
    }

    Ok(())
}

fn build_notifier(no_telegram: bool) -> Result<Arc<dyn Notifier>, AppError> {
    if no_telegram {
        Ok(Arc::new(NoopNotifier))
    } else {
        let telegram = TelegramNotifier::new(TelegramConfig::new_from_env()?)?;
        Ok(Arc::new(telegram))
    }
}

fn print_cycle_outcome(outcome: CycleOutcome) {
    match outcome {
        CycleOutcome::NoSnapshots => println!("no snapshots in the store yet"),
        CycleOutcome::AlreadyReported => println!("latest snapshot already reported"),
        CycleOutcome::DryRun { changes_found } => {
            println!("dry run complete (changes found: {changes_found})")
        }
        CycleOutcome::LostRace => println!("another reporter handled this snapshot"),
        CycleOutcome::Completed {
            changes_found,
            delivered,
        } => {
            if delivered {
                println!("report delivered (changes found: {changes_found})");
            } else {
                println!("no changes; logged without delivery");
            }
        }
    }
}
