//! Database access for jk-consolidate
//!
//! Schema creation lives in `jk_common::db`; these modules hold the queries
//! the consolidation engine issues.

pub mod ingredients;
pub mod recipe_links;
pub mod reports;
pub mod settings;

use sqlx::SqlitePool;
use std::path::Path;
use jk_common::Result;

/// Open (or create) the kitchen database with every table initialized
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!(path = %db_path.display(), "Connecting to database");
    jk_common::db::init_database(db_path).await
}
