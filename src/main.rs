//! # spec-mirror CLI (`spm`)
//!
//! The `spm` binary is the primary interface for spec-mirror. It provides
//! commands for database initialization, syncing a Spec-kit project tree into
//! the mirror, inspecting sync state, watching for changes, and running AI
//! analysis over synced features.
//!
//! ## Usage
//!
//! ```bash
//! spm --config ./spm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `spm init` | Create the SQLite database and run schema migrations |
//! | `spm sync` | Parse every feature folder and reconcile it into the mirror |
//! | `spm status` | Print a per-feature overview of the mirror |
//! | `spm watch` | Watch the project tree and re-sync on changes |
//! | `spm analyze <feature>` | Run an AI analysis over a synced feature |

use std::time::Duration;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use spec_mirror::analysis::{self, AnalysisKind};
use spec_mirror::store::{SpecStore, SqliteStore};
use spec_mirror::watcher::SpecWatcher;
use spec_mirror::{config, db, migrate, status, sync};

/// spec-mirror CLI — a local-first relational mirror of Spec-kit project
/// trees.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `spm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "spm",
    about = "spec-mirror — a local-first relational mirror of Spec-kit project trees",
    version,
    long_about = "spec-mirror parses the markdown documents a Spec-kit project produces \
    (spec.md, plan.md, tasks.md, data-model.md, research.md), reconciles them into a \
    SQLite mirror, and keeps that mirror fresh with a debounced filesystem watcher."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./spm.toml`. The project root, database path, watcher,
    /// and analysis settings are read from this file.
    #[arg(long, global = true, default_value = "./spm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (projects,
    /// features, tasks, entities, plans, requirements, user_stories,
    /// research_decisions, analyses). Idempotent — running it multiple times
    /// is safe.
    Init,

    /// Sync the project tree into the mirror.
    ///
    /// Enumerates feature folders under `<root>/specs`, parses their
    /// documents, and upserts the results. Unchanged features are skipped by
    /// content hash. A failure in one feature is reported and does not stop
    /// the others.
    Sync,

    /// Print a per-feature overview of the mirror.
    ///
    /// Shows each feature's lifecycle status, task progress, and child-record
    /// counts.
    Status,

    /// Watch the project tree and re-sync on changes.
    ///
    /// Runs an initial sync, then watches `<root>/specs` (and
    /// `<root>/.specify`) for markdown changes. Bursts of writes to one file
    /// collapse into a single re-sync after the configured quiet window.
    /// Stops on Ctrl-C.
    Watch,

    /// Run an AI analysis over a synced feature.
    ///
    /// Builds a prompt from the feature's persisted records, sends it to the
    /// configured completion provider, stores the result, and prints it.
    /// Requires `analysis.provider` to be set in the config.
    Analyze {
        /// Feature number (e.g. `001`).
        feature: String,

        /// Analysis kind: `summary`, `consistency`, or `gaps`.
        #[arg(long, default_value = "summary")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            migrate::run_migrations(&cfg).await?;
            let store = SqliteStore::new(db::connect(&cfg).await?);
            let report = run_sync(&cfg, &store).await?;
            print_report(&report);
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Watch => {
            init_tracing();
            migrate::run_migrations(&cfg).await?;
            let store = SqliteStore::new(db::connect(&cfg).await?);
            run_watch(&cfg, &store).await?;
        }
        Commands::Analyze { feature, kind } => {
            let kind = AnalysisKind::parse(&kind)?;
            let provider = analysis::provider_from_config(&cfg.analysis)?;
            migrate::run_migrations(&cfg).await?;
            let store = SqliteStore::new(db::connect(&cfg).await?);

            let project_id = store
                .upsert_project(&cfg.project.name, &cfg.project.root.display().to_string())
                .await?;
            let record = store
                .feature_by_number(&project_id, &feature)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("No synced feature '{}'. Run `spm sync` first.", feature)
                })?;

            let content =
                analysis::analyze_feature(&store, provider.as_ref(), &record.id, kind).await?;
            println!("{}", content);
        }
    }

    Ok(())
}

async fn run_sync(cfg: &config::Config, store: &dyn SpecStore) -> anyhow::Result<sync::SyncReport> {
    sync::sync_project(store, &cfg.project.name, &cfg.project.root).await
}

fn print_report(report: &sync::SyncReport) {
    println!(
        "Synced {} feature{}.",
        report.synced,
        if report.synced == 1 { "" } else { "s" }
    );
    for error in &report.errors {
        println!("  error: {}", error);
    }
}

async fn run_watch(cfg: &config::Config, store: &dyn SpecStore) -> anyhow::Result<()> {
    let report = run_sync(cfg, store).await?;
    info!(synced = report.synced, errors = report.errors.len(), "initial sync");
    for error in &report.errors {
        warn!("{}", error);
    }

    let mut watcher = SpecWatcher::new(Duration::from_millis(cfg.watcher.debounce_ms));
    let mut rx = watcher.start(&cfg.project.root)?;
    info!(path = %cfg.project.root.display(), "watching");

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                info!(
                    kind = event.kind.as_str(),
                    path = %event.path.display(),
                    feature = event.feature_number.as_deref().unwrap_or("-"),
                    "change detected"
                );
                match run_sync(cfg, store).await {
                    Ok(report) => {
                        info!(synced = report.synced, errors = report.errors.len(), "re-sync");
                        for error in &report.errors {
                            warn!("{}", error);
                        }
                    }
                    Err(e) => warn!(error = %format!("{:#}", e), "re-sync failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                break;
            }
        }
    }

    watcher.stop();
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
