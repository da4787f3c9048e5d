//! Settings database operations
//!
//! Get/set accessors for the `settings` key-value table. Defaults are seeded by
//! `jk_common::db::init_database`; the getters fall back to the same values
//! when a row is missing or NULL.

use sqlx::{Pool, Sqlite};
use jk_common::{Error, Result};

/// Get semantic comparator API key from database
///
/// **Returns:** Some(key) if set and non-empty, None otherwise
pub async fn get_comparator_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    Ok(get_setting::<String>(db, "comparator_api_key")
        .await?
        .filter(|key| !key.trim().is_empty()))
}

/// Set semantic comparator API key in database
pub async fn set_comparator_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "comparator_api_key", key).await
}

// ============================================================================
// Consolidation Parameters
// ============================================================================

/// Get variant similarity threshold
///
/// **Default:** 0.85
pub async fn get_similarity_threshold(db: &Pool<Sqlite>) -> Result<f64> {
    get_setting(db, "consolidation_similarity_threshold")
        .await
        .map(|opt| opt.unwrap_or(0.85))
}

/// Get minimum comparator confidence for merging an ambiguous pair
///
/// **Default:** 0.7
pub async fn get_semantic_min_confidence(db: &Pool<Sqlite>) -> Result<f64> {
    get_setting(db, "semantic_min_confidence")
        .await
        .map(|opt| opt.unwrap_or(0.7))
}

/// Get hard per-call comparator timeout
///
/// **Default:** 10000 ms
pub async fn get_comparator_timeout_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "comparator_timeout_ms")
        .await
        .map(|opt| opt.unwrap_or(10_000))
}

/// Get bounded comparator attempts per pair
///
/// **Default:** 3
pub async fn get_comparator_max_attempts(db: &Pool<Sqlite>) -> Result<u32> {
    get_setting(db, "comparator_max_attempts")
        .await
        .map(|opt| opt.unwrap_or(3))
}

/// Get maximum time spent retrying a locked database
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "database_max_lock_wait_ms")
        .await
        .map(|opt| opt.unwrap_or(5000))
}

/// Get how many snapshots `prune` keeps
///
/// **Default:** 10
pub async fn get_snapshot_retention_count(db: &Pool<Sqlite>) -> Result<usize> {
    get_setting(db, "snapshot_retention_count")
        .await
        .map(|opt| opt.unwrap_or(10))
}

/// Generic setting getter (internal)
///
/// NULL values read as unset.
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
