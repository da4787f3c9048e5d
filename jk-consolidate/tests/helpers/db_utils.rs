//! Database Test Utilities
//!
//! File-backed temporary databases and seeding helpers

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use jk_common::db::{Ingredient, RecipeIngredientLink};
use jk_consolidate::services::{
    BackupManager, ConsolidationOrchestrator, HeuristicComparator, ResilientComparator,
    SemanticComparator, SnapshotRepository, SqliteSnapshotRepository,
};

/// Create temporary test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_kitchen.db");

    let pool = jk_consolidate::db::init_database_pool(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Orchestrator with SQLite snapshots and the offline comparator
pub fn create_test_orchestrator(pool: SqlitePool) -> ConsolidationOrchestrator {
    let repository = Arc::new(SqliteSnapshotRepository::new(pool.clone()));
    create_orchestrator_with(pool, repository, Arc::new(HeuristicComparator::new()))
}

/// Orchestrator with injected snapshot storage and comparator
pub fn create_orchestrator_with(
    pool: SqlitePool,
    repository: Arc<dyn SnapshotRepository>,
    comparator: Arc<dyn SemanticComparator>,
) -> ConsolidationOrchestrator {
    let comparator = ResilientComparator::new(comparator, 500, 2)
        .with_initial_backoff(Duration::from_millis(1));

    ConsolidationOrchestrator::new(pool, BackupManager::new(repository), comparator)
        .with_max_lock_wait_ms(1000)
}

/// Insert an ingredient with a usage count
pub async fn seed_ingredient(pool: &SqlitePool, name: &str, usage_count: i64) -> Result<Ingredient> {
    let ingredient = Ingredient::new(name).with_usage_count(usage_count);
    jk_consolidate::db::ingredients::insert_ingredient(pool, &ingredient).await?;
    Ok(ingredient)
}

/// Insert a recipe link
pub async fn seed_link(
    pool: &SqlitePool,
    recipe_id: &str,
    ingredient_id: Uuid,
    amount: Option<&str>,
    unit: Option<&str>,
    position: i64,
) -> Result<RecipeIngredientLink> {
    let link = RecipeIngredientLink::new(recipe_id, ingredient_id, amount, unit, position);
    jk_consolidate::db::recipe_links::insert_link(pool, &link).await?;
    Ok(link)
}

/// Sorted ingredient names currently in the table
pub async fn ingredient_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>("SELECT name FROM ingredients ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(names)
}

/// Every column of both tables, row by row, for before/after comparison
pub async fn table_fingerprint(pool: &SqlitePool) -> Result<Vec<String>> {
    let ingredients = sqlx::query_as::<_, (String, String, String, i64, String)>(
        "SELECT id, name, aliases, usage_count, updated_at FROM ingredients ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    let links = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>, i64)>(
        "SELECT id, recipe_id, ingredient_id, amount, unit, position FROM recipe_ingredients ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(ingredients
        .into_iter()
        .map(|row| format!("ingredient {:?}", row))
        .chain(links.into_iter().map(|row| format!("link {:?}", row)))
        .collect())
}
