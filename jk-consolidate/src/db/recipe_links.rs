//! Recipe-ingredient link database operations

use sqlx::{Executor, Pool, Sqlite};
use uuid::Uuid;
use jk_common::db::RecipeIngredientLink;
use jk_common::Result;

use super::ingredients::placeholders;

/// Column list matching `RecipeIngredientLink::from_row`
pub const LINK_COLUMNS: &str = "id, recipe_id, ingredient_id, amount, unit, position";

/// Insert a link row
pub async fn insert_link<'e, E>(executor: E, link: &RecipeIngredientLink) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, amount, unit, position)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(link.id.to_string())
    .bind(&link.recipe_id)
    .bind(link.ingredient_id.to_string())
    .bind(&link.amount)
    .bind(&link.unit)
    .bind(link.position)
    .execute(executor)
    .await?;

    Ok(())
}

/// Every link referencing any of `ingredient_ids`, ordered by recipe then position
pub async fn links_for_ingredients<'e, E>(
    executor: E,
    ingredient_ids: &[Uuid],
) -> Result<Vec<RecipeIngredientLink>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ingredient_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM recipe_ingredients WHERE ingredient_id IN ({}) ORDER BY recipe_id, position, id",
        LINK_COLUMNS,
        placeholders(ingredient_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ingredient_ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(executor).await?;
    rows.iter().map(RecipeIngredientLink::from_row).collect()
}

/// All links of one recipe ordered by position
pub async fn links_for_recipe(db: &Pool<Sqlite>, recipe_id: &str) -> Result<Vec<RecipeIngredientLink>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM recipe_ingredients WHERE recipe_id = ? ORDER BY position, id",
        LINK_COLUMNS
    ))
    .bind(recipe_id)
    .fetch_all(db)
    .await?;

    rows.iter().map(RecipeIngredientLink::from_row).collect()
}

/// Point a link at an ingredient and overwrite its quantity
pub async fn update_link<'e, E>(
    executor: E,
    link_id: Uuid,
    ingredient_id: Uuid,
    amount: Option<&str>,
    unit: Option<&str>,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE recipe_ingredients SET ingredient_id = ?, amount = ?, unit = ? WHERE id = ?")
        .bind(ingredient_id.to_string())
        .bind(amount)
        .bind(unit)
        .bind(link_id.to_string())
        .execute(executor)
        .await?;

    Ok(())
}

/// Delete link rows; returns rows removed
pub async fn delete_links<'e, E>(executor: E, link_ids: &[Uuid]) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if link_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM recipe_ingredients WHERE id IN ({})",
        placeholders(link_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in link_ids {
        query = query.bind(id.to_string());
    }

    Ok(query.execute(executor).await?.rows_affected())
}

/// Repoint every link from `from_ids` to `to_id`; returns rows updated
///
/// Fails with a UNIQUE violation if a recipe already links `to_id`; callers
/// repair those recipes first.
pub async fn repoint_links<'e, E>(executor: E, from_ids: &[Uuid], to_id: Uuid) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if from_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "UPDATE recipe_ingredients SET ingredient_id = ? WHERE ingredient_id IN ({})",
        placeholders(from_ids.len())
    );
    let mut query = sqlx::query(&sql).bind(to_id.to_string());
    for id in from_ids {
        query = query.bind(id.to_string());
    }

    Ok(query.execute(executor).await?.rows_affected())
}

/// Distinct recipes referencing any of `ingredient_ids`
pub async fn count_recipes_referencing<'e, E>(executor: E, ingredient_ids: &[Uuid]) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ingredient_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "SELECT COUNT(DISTINCT recipe_id) FROM recipe_ingredients WHERE ingredient_id IN ({})",
        placeholders(ingredient_ids.len())
    );
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for id in ingredient_ids {
        query = query.bind(id.to_string());
    }

    let (count,) = query.fetch_one(executor).await?;
    Ok(count)
}

/// Total link count
pub async fn count_links(db: &Pool<Sqlite>) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipe_ingredients")
        .fetch_one(db)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ingredients::insert_ingredient;
    use jk_common::db::Ingredient;
    use sqlx::SqlitePool;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        jk_common::db::create_ingredients_table(&pool).await.unwrap();
        jk_common::db::create_recipe_ingredients_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_repoint_conflict_is_unique_violation() {
        let pool = setup_test_db().await;
        let chive = Ingredient::new("Chive");
        let chives = Ingredient::new("Chives");
        insert_ingredient(&pool, &chive).await.unwrap();
        insert_ingredient(&pool, &chives).await.unwrap();

        insert_link(&pool, &RecipeIngredientLink::new("r1", chive.id, Some("1"), Some("tbsp"), 0))
            .await
            .unwrap();
        insert_link(&pool, &RecipeIngredientLink::new("r1", chives.id, Some("2"), Some("tbsp"), 1))
            .await
            .unwrap();

        let err = repoint_links(&pool, &[chives.id], chive.id).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_count_recipes_referencing_is_distinct() {
        let pool = setup_test_db().await;
        let a = Ingredient::new("Scallion");
        let b = Ingredient::new("Scallions");
        insert_ingredient(&pool, &a).await.unwrap();
        insert_ingredient(&pool, &b).await.unwrap();

        insert_link(&pool, &RecipeIngredientLink::new("r1", a.id, None, None, 0)).await.unwrap();
        insert_link(&pool, &RecipeIngredientLink::new("r1", b.id, None, None, 1)).await.unwrap();
        insert_link(&pool, &RecipeIngredientLink::new("r2", b.id, None, None, 0)).await.unwrap();

        assert_eq!(count_recipes_referencing(&pool, &[a.id, b.id]).await.unwrap(), 2);
        assert_eq!(links_for_ingredients(&pool, &[b.id]).await.unwrap().len(), 2);
        assert_eq!(links_for_recipe(&pool, "r1").await.unwrap().len(), 2);
    }
}
