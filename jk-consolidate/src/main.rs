//! jk-consolidate - Ingredient vocabulary consolidation
//!
//! Finds duplicate and variant ingredient records, merges them into a
//! canonical record, and repairs the recipe links that pointed at them.
//!
//! **Usage:**
//! ```bash
//! jk-consolidate run [--phase exact|variant|all] [--threshold 0.85] [--execute]
//! jk-consolidate repair [--threshold 0.85] [--execute]
//! jk-consolidate backups
//! jk-consolidate backup [--scope ingredients_and_links] [--label TEXT]
//! jk-consolidate rollback <SNAPSHOT_ID> [--execute]
//! jk-consolidate reports [--limit 20]
//! ```
//!
//! Every mutating command is a dry run unless `--execute` is given.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use jk_common::config::{
    database_path, default_config_path, ensure_directory_exists, load_toml_config,
    RootFolderResolver, TomlConfig,
};
use jk_consolidate::config::ConsolidationSettings;
use jk_consolidate::models::{ConsolidationReport, Phase, RepairReport};
use jk_consolidate::services::{
    BackupManager, ConsolidationOrchestrator, RunOptions, SnapshotScope, SqliteSnapshotRepository,
};

/// Command-line arguments for jk-consolidate
#[derive(Parser, Debug)]
#[command(name = "jk-consolidate")]
#[command(about = "Consolidate duplicate ingredients and repair recipe links")]
#[command(version)]
struct Args {
    /// Root folder holding the database and reports
    #[arg(long, global = true, env = "JK_ROOT_FOLDER")]
    root: Option<PathBuf>,

    /// Database file (default: <root>/joanies-kitchen.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze and (with --execute) merge duplicate ingredients
    Run {
        /// exact, variant or all
        #[arg(long, default_value = "all")]
        phase: Phase,

        /// Variant similarity threshold (0.0-1.0]
        #[arg(long)]
        threshold: Option<f64>,

        /// Apply the merges (default: dry run)
        #[arg(long)]
        execute: bool,

        /// Do not consult the semantic comparator
        #[arg(long)]
        no_semantic: bool,

        /// Directory for the JSON report file
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,
    },

    /// Resolve per-recipe link conflicts without merging ingredients
    Repair {
        /// Variant similarity threshold (0.0-1.0]
        #[arg(long)]
        threshold: Option<f64>,

        /// Apply the repairs (default: dry run)
        #[arg(long)]
        execute: bool,

        /// Do not consult the semantic comparator
        #[arg(long)]
        no_semantic: bool,

        /// Directory for the JSON report file
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,
    },

    /// List snapshots, newest first
    Backups,

    /// Take a snapshot now
    Backup {
        /// ingredients_only or ingredients_and_links
        #[arg(long, default_value = "ingredients_and_links")]
        scope: SnapshotScope,

        #[arg(long, default_value = "manual backup")]
        label: String,
    },

    /// Delete snapshots beyond the newest N (default: list what would go)
    Prune {
        /// Snapshots to keep (default: the snapshot_retention_count setting)
        #[arg(long)]
        keep: Option<usize>,

        /// Delete the snapshots
        #[arg(long)]
        execute: bool,
    },

    /// Restore a snapshot (default: report what would change)
    Rollback {
        snapshot_id: String,

        /// Perform the restore
        #[arg(long)]
        execute: bool,
    },

    /// List stored run reports, newest first
    Reports {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path("jk-consolidate"));
    let toml_config = load_toml_config(config_path.as_deref())?;

    init_tracing(&args, &toml_config);

    info!(
        "jk-consolidate {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(args.root.clone()).resolve(&toml_config);
    ensure_directory_exists(&root_folder)
        .with_context(|| format!("Failed to initialize root folder {}", root_folder.display()))?;

    let db_path = args.database.clone().unwrap_or_else(|| database_path(&root_folder));
    info!("Database: {}", db_path.display());
    let db = jk_consolidate::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let settings = ConsolidationSettings::load(&db, &toml_config, &root_folder).await?;
    let backup_manager = BackupManager::new(Arc::new(SqliteSnapshotRepository::new(db.clone())));

    match args.command {
        Command::Run {
            phase,
            threshold,
            execute,
            no_semantic,
            report_dir,
        } => {
            let options = run_options(&settings, phase, threshold, execute, no_semantic);
            let orchestrator = build_orchestrator(&db, &settings, backup_manager)?;

            let report = match orchestrator.run(&options).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Consolidation aborted: {}", e);
                    return Err(e.into());
                }
            };

            let report_dir = report_dir.unwrap_or_else(|| settings.report_dir.clone());
            let path = write_report_file(&report_dir, &report.report_id, &report)?;
            print_consolidation_summary(&report, &path);

            Ok(exit_code(report.failed_groups()))
        }

        Command::Repair {
            threshold,
            execute,
            no_semantic,
            report_dir,
        } => {
            let options = run_options(&settings, Phase::All, threshold, execute, no_semantic);
            let orchestrator = build_orchestrator(&db, &settings, backup_manager)?;

            let report = orchestrator.repair_links(&options).await?;

            let report_dir = report_dir.unwrap_or_else(|| settings.report_dir.clone());
            let path = write_report_file(&report_dir, &report.report_id, &report)?;
            print_repair_summary(&report, &path);

            Ok(exit_code(report.errors.len() + report.stats.errors.len()))
        }

        Command::Backups => {
            let snapshots = backup_manager.list_backups().await?;
            let retention = jk_consolidate::db::settings::get_snapshot_retention_count(&db).await?;
            if snapshots.is_empty() {
                println!("No snapshots");
            }
            for snapshot in &snapshots {
                println!(
                    "{}  {}  {:<22} ingredients={:<6} links={:<6} {}",
                    snapshot.id,
                    snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.scope,
                    snapshot.ingredient_rows,
                    snapshot.link_rows,
                    snapshot.label
                );
            }
            if snapshots.len() > retention {
                println!(
                    "{} snapshots stored, retention is {}: `prune --execute` removes the oldest {}",
                    snapshots.len(),
                    retention,
                    snapshots.len() - retention
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Prune { keep, execute } => {
            let keep = match keep {
                Some(keep) => keep,
                None => jk_consolidate::db::settings::get_snapshot_retention_count(&db).await?,
            };
            let expired = backup_manager.prune_backups(keep, execute).await?;

            for id in &expired {
                println!("{} {}", if execute { "Deleted" } else { "Would delete" }, id);
            }
            if expired.is_empty() {
                println!("Nothing to prune (keeping {})", keep);
            } else if !execute {
                println!("Dry run: nothing changed. Re-run with --execute to delete.");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Backup { scope, label } => {
            let snapshot_id = backup_manager.create_backup(scope, &label).await?;
            println!("Created snapshot {}", snapshot_id);
            Ok(ExitCode::SUCCESS)
        }

        Command::Rollback { snapshot_id, execute } => {
            let report = backup_manager.rollback(&snapshot_id, execute).await?;

            println!(
                "Snapshot {} ({}): ingredients {} live / {} in snapshot (delta {:+})",
                report.snapshot_id,
                report.scope,
                report.live_before.ingredients,
                report.snapshot_ingredient_rows,
                report.ingredient_delta
            );
            if let (Some(rows), Some(delta)) = (report.snapshot_link_rows, report.link_delta) {
                println!(
                    "  links {} live / {} in snapshot (delta {:+})",
                    report.live_before.links, rows, delta
                );
            }
            match (&report.pre_rollback_snapshot, report.live_after) {
                (Some(pre), Some(after)) => println!(
                    "Restored. Previous state saved as snapshot {} (now {} ingredients, {} links)",
                    pre, after.ingredients, after.links
                ),
                _ => println!("Dry run: nothing changed. Re-run with --execute to restore."),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Reports { limit } => {
            for summary in jk_consolidate::db::reports::list_reports(&db, limit).await? {
                println!(
                    "{}  {:<13} phase={:<8} executed={:<5} failed_groups={} snapshot={}",
                    summary.started_at,
                    summary.kind,
                    summary.phase.as_deref().unwrap_or("-"),
                    summary.executed,
                    summary.failed_groups,
                    summary.snapshot_id.as_deref().unwrap_or("-")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `RUST_LOG` wins; otherwise -q / -v / -vv, then the TOML level
fn init_tracing(args: &Args, toml_config: &TomlConfig) {
    let level = if args.quiet {
        "warn".to_string()
    } else {
        match args.verbose {
            0 => toml_config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_options(
    settings: &ConsolidationSettings,
    phase: Phase,
    threshold: Option<f64>,
    execute: bool,
    no_semantic: bool,
) -> RunOptions {
    RunOptions {
        phase,
        threshold: threshold.unwrap_or(settings.threshold),
        min_semantic_confidence: settings.min_semantic_confidence,
        execute,
        use_semantic: !no_semantic,
    }
}

fn build_orchestrator(
    db: &SqlitePool,
    settings: &ConsolidationSettings,
    backup_manager: BackupManager,
) -> Result<ConsolidationOrchestrator> {
    let comparator = settings.build_comparator()?;
    info!(comparator = comparator.inner_name(), "Semantic comparator ready");

    Ok(
        ConsolidationOrchestrator::new(db.clone(), backup_manager, comparator)
            .with_max_lock_wait_ms(settings.max_lock_wait_ms),
    )
}

/// Write `<dir>/<report_id>.json`
fn write_report_file<T: serde::Serialize>(dir: &Path, report_id: &str, report: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let path = dir.join(format!("{}.json", report_id));
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;

    info!(path = %path.display(), "Report written");
    Ok(path)
}

fn print_consolidation_summary(report: &ConsolidationReport, path: &Path) {
    let mode = if report.executed { "EXECUTED" } else { "DRY RUN" };
    println!("Consolidation {} (phase {}, threshold {})", mode, report.phase, report.threshold);
    if let Some(snapshot_id) = &report.snapshot_id {
        println!("Backup snapshot: {}", snapshot_id);
    }
    println!("{}", report.statistics.display_string());

    for entry in &report.decisions {
        println!(
            "  [{}] {} <- {} ({} recipes) {:?}",
            entry.decision.group_id,
            entry.decision.canonical_name,
            entry.decision.duplicate_names.join(", "),
            entry.decision.affected_recipes,
            entry.outcome
        );
    }
    for kept in &report.kept_separate {
        let names: Vec<&str> = kept.rejected.iter().map(|r| r.name.as_str()).collect();
        println!("  [{}] {} kept separate from {}", kept.group_id, kept.canonical_name, names.join(", "));
    }
    if !report.review_items.is_empty() {
        println!("Manual review:");
        for item in &report.review_items {
            println!("  {} / {}: {}", item.canonical_name, item.candidate_name, item.reason);
        }
    }
    for failure in &report.errors {
        warn!(group_id = %failure.group_id, "Failed group: {}", failure.error);
    }
    println!("Report: {}", path.display());
}

fn print_repair_summary(report: &RepairReport, path: &Path) {
    let mode = if report.executed { "EXECUTED" } else { "DRY RUN" };
    println!("Link repair {} over {} groups", mode, report.groups);
    if let Some(snapshot_id) = &report.snapshot_id {
        println!("Backup snapshot: {}", snapshot_id);
    }
    println!("{}", report.stats.display_string());
    for warning in &report.stats.warnings {
        println!("  warning: {}", warning);
    }
    for failure in &report.stats.errors {
        println!("  recipe {} failed: {}", failure.recipe_id, failure.error);
    }
    for failure in &report.errors {
        println!("  group {} failed: {}", failure.group_id, failure.error);
    }
    println!("Report: {}", path.display());
}

/// Non-zero when anything failed
fn exit_code(failures: usize) -> ExitCode {
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
