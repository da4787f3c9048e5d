//! Ingredient vocabulary database operations
//!
//! Single-statement operations are generic over the executor so they can run
//! against the pool (analysis) or inside a decision transaction (execution).

use chrono::Utc;
use sqlx::{Executor, Pool, Sqlite};
use uuid::Uuid;
use jk_common::db::Ingredient;
use jk_common::{Error, Result};

/// Column list matching `Ingredient::from_row`
pub const INGREDIENT_COLUMNS: &str =
    "id, name, display_name, category, aliases, usage_count, is_common, created_at, updated_at";

/// `?, ?, ?` for an IN clause of `count` values
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Insert an ingredient row
pub async fn insert_ingredient<'e, E>(executor: E, ingredient: &Ingredient) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let aliases = serde_json::to_string(&ingredient.aliases)
        .map_err(|e| Error::Internal(format!("Failed to serialize aliases: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO ingredients (
            id, name, display_name, category, aliases, usage_count, is_common, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(ingredient.id.to_string())
    .bind(&ingredient.name)
    .bind(&ingredient.display_name)
    .bind(&ingredient.category)
    .bind(aliases)
    .bind(ingredient.usage_count)
    .bind(ingredient.is_common as i64)
    .bind(ingredient.created_at.to_rfc3339())
    .bind(ingredient.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Load the full vocabulary ordered by name
pub async fn load_all_ingredients(db: &Pool<Sqlite>) -> Result<Vec<Ingredient>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM ingredients ORDER BY name, id",
        INGREDIENT_COLUMNS
    ))
    .fetch_all(db)
    .await?;

    rows.iter().map(Ingredient::from_row).collect()
}

/// Load one ingredient by id
pub async fn load_ingredient(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<Ingredient>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM ingredients WHERE id = ?",
        INGREDIENT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(db)
    .await?;

    row.as_ref().map(Ingredient::from_row).transpose()
}

/// Load one ingredient by its unique name
pub async fn load_ingredient_by_name(db: &Pool<Sqlite>, name: &str) -> Result<Option<Ingredient>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM ingredients WHERE name = ?",
        INGREDIENT_COLUMNS
    ))
    .bind(name)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(Ingredient::from_row).transpose()
}

/// Load the rows among `ids` that still exist, ordered by (name, id)
pub async fn load_ingredients_by_ids<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<Ingredient>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM ingredients WHERE id IN ({}) ORDER BY name, id",
        INGREDIENT_COLUMNS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(executor).await?;
    rows.iter().map(Ingredient::from_row).collect()
}

/// Overwrite the canonical's alias list and usage count
pub async fn update_canonical<'e, E>(
    executor: E,
    id: Uuid,
    aliases: &[String],
    usage_count: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let aliases = serde_json::to_string(aliases)
        .map_err(|e| Error::Internal(format!("Failed to serialize aliases: {}", e)))?;

    let result = sqlx::query(
        "UPDATE ingredients SET aliases = ?, usage_count = ?, updated_at = ? WHERE id = ?",
    )
    .bind(aliases)
    .bind(usage_count)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Canonical ingredient {} not found", id)));
    }

    Ok(())
}

/// Delete ingredient rows; returns rows removed
pub async fn delete_ingredients<'e, E>(executor: E, ids: &[Uuid]) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM ingredients WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    Ok(query.execute(executor).await?.rows_affected())
}

/// Number of distinct recipes referencing an ingredient
pub async fn count_recipes_using<'e, E>(executor: E, id: Uuid) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT recipe_id) FROM recipe_ingredients WHERE ingredient_id = ?",
    )
    .bind(id.to_string())
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Total vocabulary size
pub async fn count_ingredients(db: &Pool<Sqlite>) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients")
        .fetch_one(db)
        .await?;
    Ok(count)
}
