//! Integration tests for database initialization
//!
//! Verifies schema creation is idempotent and that the constraints the
//! consolidation engine relies on are enforced by the store.

use jk_common::db::{init_database, Ingredient};
use tempfile::TempDir;

async fn insert_ingredient(pool: &sqlx::SqlitePool, ingredient: &Ingredient) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO ingredients (id, name, display_name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(ingredient.id.to_string())
    .bind(&ingredient.name)
    .bind(&ingredient.display_name)
    .bind(ingredient.created_at.to_rfc3339())
    .bind(ingredient.updated_at.to_rfc3339())
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_init_creates_tables_and_settings() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("kitchen.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "consolidation_reports",
        "ingredients",
        "recipe_ingredients",
        "settings",
        "snapshots",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }

    let threshold: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'consolidation_similarity_threshold'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(threshold, "0.85");
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("kitchen.db");

    let pool = init_database(&db_path).await.unwrap();
    insert_ingredient(&pool, &Ingredient::new("Chive")).await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingredients")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_ingredient_name_is_unique() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("kitchen.db")).await.unwrap();

    insert_ingredient(&pool, &Ingredient::new("Chive")).await.unwrap();
    let err = insert_ingredient(&pool, &Ingredient::new("Chive")).await.unwrap_err();

    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("Expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_link_requires_existing_ingredient() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("kitchen.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, position) VALUES ('l1', 'r1', 'missing', 0)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Foreign key should reject dangling link");
}
