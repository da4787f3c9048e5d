//! Integration tests for recipe link repair
//!
//! Both the repair performed inside a merge and the standalone repair pass.

mod helpers;

use helpers::*;
use jk_consolidate::db::{ingredients, recipe_links};
use jk_consolidate::services::RunOptions;

#[tokio::test]
async fn test_same_unit_amounts_summed_onto_canonical() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let chive = seed_ingredient(&pool, "Chive", 5).await.unwrap();
    let chives = seed_ingredient(&pool, "Chives", 1).await.unwrap();
    seed_link(&pool, "omelette", chive.id, Some("1"), Some("tablespoon"), 0)
        .await
        .unwrap();
    seed_link(&pool, "omelette", chives.id, Some("2"), Some("tablespoons"), 1)
        .await
        .unwrap();
    let orchestrator = create_test_orchestrator(pool.clone());

    let report = orchestrator
        .run(&RunOptions {
            execute: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.statistics.repair.recipes_with_conflicts, 1);
    assert_eq!(report.statistics.repair.links_removed, 1);
    assert_eq!(report.statistics.repair.amounts_merged, 1);

    let links = recipe_links::links_for_recipe(&pool, "omelette").await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].ingredient_id, chive.id);
    assert_eq!(links[0].amount.as_deref(), Some("3"));
    assert_eq!(links[0].unit.as_deref(), Some("tablespoon"));
}

#[tokio::test]
async fn test_incompatible_units_keep_first_quantity() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let onion = seed_ingredient(&pool, "Onion", 9).await.unwrap();
    let onions = seed_ingredient(&pool, "Onions", 2).await.unwrap();
    seed_link(&pool, "stew", onions.id, Some("2"), None, 0).await.unwrap();
    seed_link(&pool, "stew", onion.id, Some("1"), Some("cup"), 4).await.unwrap();
    let orchestrator = create_test_orchestrator(pool.clone());

    let report = orchestrator
        .run(&RunOptions {
            execute: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let warnings = &report.statistics.repair.warnings;
    assert_eq!(warnings.len(), 1, "warnings: {:?}", warnings);
    assert!(warnings[0].contains("incompatible units"));
    assert_eq!(report.statistics.repair.amounts_merged, 0);

    // Canonical's own link survives even though it sits later in the recipe
    let links = recipe_links::links_for_recipe(&pool, "stew").await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].ingredient_id, onion.id);
    assert_eq!(links[0].amount.as_deref(), Some("1"));
    assert_eq!(links[0].unit.as_deref(), Some("cup"));
}

#[tokio::test]
async fn test_unparseable_amount_excluded_with_warning() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let lemon = seed_ingredient(&pool, "Lemon", 6).await.unwrap();
    let lemons = seed_ingredient(&pool, "Lemons", 1).await.unwrap();
    seed_link(&pool, "tart", lemon.id, Some("2"), None, 0).await.unwrap();
    seed_link(&pool, "tart", lemons.id, Some("a few"), None, 1).await.unwrap();
    let orchestrator = create_test_orchestrator(pool.clone());

    let report = orchestrator
        .run(&RunOptions {
            execute: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report
        .statistics
        .repair
        .warnings
        .iter()
        .any(|w| w.contains("a few")));

    let links = recipe_links::links_for_recipe(&pool, "tart").await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].amount.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_standalone_repair_dry_run_then_execute() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let chive = seed_ingredient(&pool, "Chive", 5).await.unwrap();
    let chives = seed_ingredient(&pool, "Chives", 1).await.unwrap();
    seed_link(&pool, "omelette", chive.id, Some("1"), Some("tablespoon"), 0)
        .await
        .unwrap();
    seed_link(&pool, "omelette", chives.id, Some("2"), Some("tablespoon"), 1)
        .await
        .unwrap();
    seed_link(&pool, "soup", chives.id, Some("1"), Some("bunch"), 0)
        .await
        .unwrap();
    let orchestrator = create_test_orchestrator(pool.clone());

    let before = table_fingerprint(&pool).await.unwrap();
    let preview = orchestrator.repair_links(&RunOptions::default()).await.unwrap();
    assert_eq!(table_fingerprint(&pool).await.unwrap(), before);
    assert!(!preview.executed);
    assert_eq!(preview.groups, 1);
    assert_eq!(preview.stats.recipes_with_conflicts, 1);
    assert_eq!(preview.stats.links_removed, 1);

    let report = orchestrator
        .repair_links(&RunOptions {
            execute: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(report.executed);
    assert!(report.snapshot_id.is_some());
    assert!(report.errors.is_empty());
    assert_eq!(report.stats, preview.stats);

    // Conflict gone, but no ingredient row merged
    let omelette = recipe_links::links_for_recipe(&pool, "omelette").await.unwrap();
    assert_eq!(omelette.len(), 1);
    assert_eq!(omelette[0].ingredient_id, chive.id);
    assert_eq!(omelette[0].amount.as_deref(), Some("3"));

    let soup = recipe_links::links_for_recipe(&pool, "soup").await.unwrap();
    assert_eq!(soup[0].ingredient_id, chives.id);
    assert_eq!(ingredients::count_ingredients(&pool).await.unwrap(), 2);
}
