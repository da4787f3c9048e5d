//! Database initialization
//!
//! Opens (or creates) the kitchen database and creates the tables the
//! consolidation engine reads and writes. Every `CREATE` is idempotent so the
//! initializer is safe to run on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys, WAL and busy timeout are per-connection, so they are set on
    // the connect options rather than issued once against the pool
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the consolidation tools
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_ingredients_table(pool).await?;
    create_recipe_ingredients_table(pool).await?;
    create_snapshots_table(pool).await?;
    create_consolidation_reports_table(pool).await?;
    init_default_settings(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the ingredients table
///
/// `name` is the unique lookup key; `aliases` is a JSON array of alternate
/// display names.
pub async fn create_ingredients_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingredients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            category TEXT,
            aliases TEXT NOT NULL DEFAULT '[]',
            usage_count INTEGER NOT NULL DEFAULT 0,
            is_common INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the recipe_ingredients link table
///
/// UNIQUE(recipe_id, ingredient_id) is the per-recipe uniqueness constraint the
/// link repairer has to respect; the foreign key keeps links from pointing at
/// deleted ingredients.
pub async fn create_recipe_ingredients_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            id TEXT PRIMARY KEY,
            recipe_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL REFERENCES ingredients(id),
            amount TEXT,
            unit TEXT,
            position INTEGER NOT NULL DEFAULT 0,
            UNIQUE(recipe_id, ingredient_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_ingredient ON recipe_ingredients(ingredient_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the snapshot registry
///
/// Snapshot data lives in `ingredients_backup_<id>` and
/// `recipe_ingredients_backup_<id>` tables; this table records which exist.
pub async fn create_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            scope TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            ingredient_rows INTEGER NOT NULL DEFAULT 0,
            link_rows INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the persisted run report table
pub async fn create_consolidation_reports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consolidation_reports (
            report_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            phase TEXT,
            executed INTEGER NOT NULL DEFAULT 0,
            snapshot_id TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            failed_groups INTEGER NOT NULL DEFAULT 0,
            report TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure all required settings exist with default values
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "consolidation_similarity_threshold", "0.85").await?;
    ensure_setting(pool, "semantic_min_confidence", "0.7").await?;
    ensure_setting(pool, "comparator_timeout_ms", "10000").await?;
    ensure_setting(pool, "comparator_max_attempts", "3").await?;
    ensure_setting(pool, "database_max_lock_wait_ms", "5000").await?;
    ensure_setting(pool, "snapshot_retention_count", "10").await?;
    Ok(())
}

/// Insert a setting if absent, or reset it when stored as NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}
