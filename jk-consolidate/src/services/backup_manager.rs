//! Snapshot and rollback of the ingredient tables
//!
//! A snapshot copies `ingredients` (and optionally `recipe_ingredients`) into
//! `ingredients_backup_<id>` / `recipe_ingredients_backup_<id>` tables and
//! registers the copy in `snapshots`. Consolidation takes one before its first
//! mutation; rollback restores from one, after first snapshotting the current
//! state so the rollback itself can be undone.
//!
//! Snapshot ids are generated here and validated against `[A-Za-z0-9_]`
//! before being spliced into table names.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::begin_monitored;

const INGREDIENT_COLUMNS: &str =
    "id, name, display_name, category, aliases, usage_count, is_common, created_at, updated_at";
const LINK_COLUMNS: &str = "id, recipe_id, ingredient_id, amount, unit, position";
const MAX_SNAPSHOT_ID_LEN: usize = 64;

/// Backup and restore errors
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Snapshot creation failed: {0}")]
    CreationFailed(String),

    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(String),

    #[error("Invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] jk_common::Error),
}

impl From<sqlx::Error> for BackupError {
    fn from(e: sqlx::Error) -> Self {
        BackupError::Database(jk_common::Error::Database(e))
    }
}

/// Tables captured by a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotScope {
    IngredientsOnly,
    IngredientsAndLinks,
}

impl SnapshotScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotScope::IngredientsOnly => "ingredients_only",
            SnapshotScope::IngredientsAndLinks => "ingredients_and_links",
        }
    }

    pub fn includes_links(&self) -> bool {
        matches!(self, SnapshotScope::IngredientsAndLinks)
    }
}

impl fmt::Display for SnapshotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingredients_only" | "ingredients" => Ok(SnapshotScope::IngredientsOnly),
            "ingredients_and_links" | "all" => Ok(SnapshotScope::IngredientsAndLinks),
            other => Err(format!("unknown snapshot scope '{}'", other)),
        }
    }
}

/// Registered snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub scope: SnapshotScope,
    pub label: String,
    pub ingredient_rows: i64,
    /// Zero for ingredients-only snapshots
    pub link_rows: i64,
}

impl SnapshotInfo {
    pub fn ingredient_table(&self) -> String {
        format!("ingredients_backup_{}", self.id)
    }

    pub fn link_table(&self) -> String {
        format!("recipe_ingredients_backup_{}", self.id)
    }
}

/// Live row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub ingredients: i64,
    pub links: i64,
}

/// What a rollback did (or would do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    pub snapshot_id: String,
    pub scope: SnapshotScope,
    pub executed: bool,
    pub live_before: TableCounts,
    pub snapshot_ingredient_rows: i64,
    pub snapshot_link_rows: Option<i64>,
    /// Snapshot rows minus live rows
    pub ingredient_delta: i64,
    pub link_delta: Option<i64>,
    /// Snapshot of the state replaced by an executed rollback
    pub pre_rollback_snapshot: Option<String>,
    pub live_after: Option<TableCounts>,
}

/// Snapshot storage
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn create_snapshot(&self, scope: SnapshotScope, label: &str) -> Result<SnapshotInfo, BackupError>;

    /// Newest first
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, BackupError>;

    async fn get_snapshot(&self, id: &str) -> Result<SnapshotInfo, BackupError>;

    async fn live_counts(&self) -> Result<TableCounts, BackupError>;

    /// Replace live tables in the snapshot's scope with its contents
    async fn restore_snapshot(&self, id: &str) -> Result<(), BackupError>;

    /// Drop the snapshot's tables and unregister it
    async fn delete_snapshot(&self, id: &str) -> Result<(), BackupError>;
}

/// `YYYYMMDDTHHMMSSmmm_<8 hex>`
pub fn new_snapshot_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%dT%H%M%S%3f"), &random[..8])
}

/// Reject ids that could not have been generated by [`new_snapshot_id`]
pub fn validate_snapshot_id(id: &str) -> Result<(), BackupError> {
    if id.is_empty()
        || id.len() > MAX_SNAPSHOT_ID_LEN
        || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(BackupError::InvalidSnapshotId(id.to_string()));
    }
    Ok(())
}

// ============================================================================
// SQLite repository
// ============================================================================

/// Snapshots stored as tables in the same database
pub struct SqliteSnapshotRepository {
    db: Pool<Sqlite>,
}

impl SqliteSnapshotRepository {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    async fn create_inner(&self, id: &str, scope: SnapshotScope, label: &str) -> jk_common::Result<SnapshotInfo> {
        let info_tables = SnapshotInfo {
            id: id.to_string(),
            created_at: Utc::now(),
            scope,
            label: label.to_string(),
            ingredient_rows: 0,
            link_rows: 0,
        };

        let mut tx = begin_monitored(&self.db, "backup_manager::create_snapshot").await?;

        // No IF NOT EXISTS: an id collision must fail rather than reuse a table
        sqlx::query(&format!(
            "CREATE TABLE \"{}\" AS SELECT {} FROM ingredients",
            info_tables.ingredient_table(),
            INGREDIENT_COLUMNS
        ))
        .execute(&mut **tx.inner_mut())
        .await?;

        let (ingredient_rows,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM \"{}\"",
            info_tables.ingredient_table()
        ))
        .fetch_one(&mut **tx.inner_mut())
        .await?;

        let mut link_rows = 0;
        if scope.includes_links() {
            sqlx::query(&format!(
                "CREATE TABLE \"{}\" AS SELECT {} FROM recipe_ingredients",
                info_tables.link_table(),
                LINK_COLUMNS
            ))
            .execute(&mut **tx.inner_mut())
            .await?;

            let (rows,): (i64,) = sqlx::query_as(&format!(
                "SELECT COUNT(*) FROM \"{}\"",
                info_tables.link_table()
            ))
            .fetch_one(&mut **tx.inner_mut())
            .await?;
            link_rows = rows;
        }

        sqlx::query(
            "INSERT INTO snapshots (id, created_at, scope, label, ingredient_rows, link_rows) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(info_tables.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(scope.as_str())
        .bind(label)
        .bind(ingredient_rows)
        .bind(link_rows)
        .execute(&mut **tx.inner_mut())
        .await?;

        tx.commit().await?;

        Ok(SnapshotInfo {
            ingredient_rows,
            link_rows,
            ..info_tables
        })
    }

    async fn restore_inner(&self, info: &SnapshotInfo) -> jk_common::Result<()> {
        let mut tx = begin_monitored(&self.db, "backup_manager::restore_snapshot").await?;

        // Links and ingredients are swapped in one transaction; FK checks run at commit
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut **tx.inner_mut())
            .await?;

        if info.scope.includes_links() {
            sqlx::query("DELETE FROM recipe_ingredients")
                .execute(&mut **tx.inner_mut())
                .await?;
        }

        sqlx::query("DELETE FROM ingredients")
            .execute(&mut **tx.inner_mut())
            .await?;

        sqlx::query(&format!(
            "INSERT INTO ingredients ({cols}) SELECT {cols} FROM \"{table}\"",
            cols = INGREDIENT_COLUMNS,
            table = info.ingredient_table()
        ))
        .execute(&mut **tx.inner_mut())
        .await?;

        if info.scope.includes_links() {
            sqlx::query(&format!(
                "INSERT INTO recipe_ingredients ({cols}) SELECT {cols} FROM \"{table}\"",
                cols = LINK_COLUMNS,
                table = info.link_table()
            ))
            .execute(&mut **tx.inner_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_inner(&self, info: &SnapshotInfo) -> jk_common::Result<()> {
        let mut tx = begin_monitored(&self.db, "backup_manager::delete_snapshot").await?;

        // Ingredients-only snapshots never created a link table
        for table in [info.ingredient_table(), info.link_table()] {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
                .execute(&mut **tx.inner_mut())
                .await?;
        }

        sqlx::query("DELETE FROM snapshots WHERE id = ?")
            .bind(&info.id)
            .execute(&mut **tx.inner_mut())
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn create_snapshot(&self, scope: SnapshotScope, label: &str) -> Result<SnapshotInfo, BackupError> {
        let id = new_snapshot_id();
        validate_snapshot_id(&id)?;

        let info = self
            .create_inner(&id, scope, label)
            .await
            .map_err(|e| BackupError::CreationFailed(e.to_string()))?;

        tracing::info!(
            snapshot_id = %info.id,
            scope = %info.scope,
            ingredient_rows = info.ingredient_rows,
            link_rows = info.link_rows,
            label = %info.label,
            "Snapshot created"
        );

        Ok(info)
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, BackupError> {
        let rows: Vec<(String, String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT id, created_at, scope, label, ingredient_rows, link_rows FROM snapshots ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(snapshot_from_row).collect()
    }

    async fn get_snapshot(&self, id: &str) -> Result<SnapshotInfo, BackupError> {
        validate_snapshot_id(id)?;

        let row: Option<(String, String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT id, created_at, scope, label, ingredient_rows, link_rows FROM snapshots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => snapshot_from_row(row),
            None => Err(BackupError::UnknownSnapshot(id.to_string())),
        }
    }

    async fn live_counts(&self) -> Result<TableCounts, BackupError> {
        let (ingredients,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients")
            .fetch_one(&self.db)
            .await?;
        let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipe_ingredients")
            .fetch_one(&self.db)
            .await?;
        Ok(TableCounts { ingredients, links })
    }

    async fn restore_snapshot(&self, id: &str) -> Result<(), BackupError> {
        let info = self.get_snapshot(id).await?;

        self.restore_inner(&info)
            .await
            .map_err(|e| BackupError::RestoreFailed(e.to_string()))?;

        tracing::info!(snapshot_id = %id, scope = %info.scope, "Snapshot restored");
        Ok(())
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), BackupError> {
        let info = self.get_snapshot(id).await?;
        self.delete_inner(&info).await?;

        tracing::info!(snapshot_id = %id, "Snapshot deleted");
        Ok(())
    }
}

fn snapshot_from_row(
    (id, created_at, scope, label, ingredient_rows, link_rows): (String, String, String, String, i64, i64),
) -> Result<SnapshotInfo, BackupError> {
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| jk_common::Error::Internal(format!("Invalid snapshot timestamp: {}", e)))?;
    let scope = scope
        .parse::<SnapshotScope>()
        .map_err(jk_common::Error::Internal)?;

    Ok(SnapshotInfo {
        id,
        created_at,
        scope,
        label,
        ingredient_rows,
        link_rows,
    })
}

// ============================================================================
// Backup manager
// ============================================================================

/// Creates snapshots and performs rollbacks
#[derive(Clone)]
pub struct BackupManager {
    repository: Arc<dyn SnapshotRepository>,
}

impl BackupManager {
    pub fn new(repository: Arc<dyn SnapshotRepository>) -> Self {
        Self { repository }
    }

    /// Snapshot the current state; returns the snapshot id
    pub async fn create_backup(&self, scope: SnapshotScope, label: &str) -> Result<String, BackupError> {
        Ok(self.repository.create_snapshot(scope, label).await?.id)
    }

    /// Registered snapshots, newest first
    pub async fn list_backups(&self) -> Result<Vec<SnapshotInfo>, BackupError> {
        self.repository.list_snapshots().await
    }

    /// Delete all but the newest `keep` snapshots
    ///
    /// Returns the ids removed (or that would be removed on a dry run), oldest
    /// last. Stops at the first failure; snapshots already deleted stay deleted.
    pub async fn prune_backups(&self, keep: usize, execute: bool) -> Result<Vec<String>, BackupError> {
        let expired: Vec<String> = self
            .repository
            .list_snapshots()
            .await?
            .into_iter()
            .skip(keep)
            .map(|info| info.id)
            .collect();

        if !execute {
            tracing::info!(keep, expired = expired.len(), "Prune dry run");
            return Ok(expired);
        }

        for id in &expired {
            self.repository.delete_snapshot(id).await?;
        }

        tracing::info!(keep, removed = expired.len(), "Snapshots pruned");
        Ok(expired)
    }

    /// Restore a snapshot, or report what restoring would change
    ///
    /// **Algorithm:**
    /// 1. Validate the id and look the snapshot up
    /// 2. Compare live row counts with the snapshot's counts
    /// 3. Dry run: return the deltas
    /// 4. Execute: snapshot the live state (same scope), then restore
    pub async fn rollback(&self, snapshot_id: &str, execute: bool) -> Result<RollbackReport, BackupError> {
        validate_snapshot_id(snapshot_id)?;
        let info = self.repository.get_snapshot(snapshot_id).await?;
        let live_before = self.repository.live_counts().await?;

        let snapshot_link_rows = info.scope.includes_links().then_some(info.link_rows);
        let mut report = RollbackReport {
            snapshot_id: info.id.clone(),
            scope: info.scope,
            executed: execute,
            live_before,
            snapshot_ingredient_rows: info.ingredient_rows,
            snapshot_link_rows,
            ingredient_delta: info.ingredient_rows - live_before.ingredients,
            link_delta: snapshot_link_rows.map(|rows| rows - live_before.links),
            pre_rollback_snapshot: None,
            live_after: None,
        };

        if !execute {
            tracing::info!(
                snapshot_id,
                ingredient_delta = report.ingredient_delta,
                link_delta = ?report.link_delta,
                "Rollback dry run"
            );
            return Ok(report);
        }

        let pre = self
            .repository
            .create_snapshot(info.scope, &format!("pre-rollback {}", snapshot_id))
            .await?;
        report.pre_rollback_snapshot = Some(pre.id);

        self.repository.restore_snapshot(snapshot_id).await?;
        report.live_after = Some(self.repository.live_counts().await?);

        tracing::info!(
            snapshot_id,
            pre_rollback_snapshot = ?report.pre_rollback_snapshot,
            "Rollback complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_validate() {
        let id = new_snapshot_id();
        assert!(validate_snapshot_id(&id).is_ok(), "{}", id);
        assert_eq!(id.len(), "20260101T120000123_abcdef01".len());
    }

    #[test]
    fn test_hostile_ids_rejected() {
        let too_long = "a".repeat(65);
        for id in ["", "x; DROP TABLE ingredients", "a\"b", "../etc", too_long.as_str()] {
            assert!(matches!(
                validate_snapshot_id(id),
                Err(BackupError::InvalidSnapshotId(_))
            ));
        }
    }

    #[test]
    fn test_scope_round_trip() {
        for scope in [SnapshotScope::IngredientsOnly, SnapshotScope::IngredientsAndLinks] {
            assert_eq!(scope.as_str().parse::<SnapshotScope>().unwrap(), scope);
        }
    }
}
