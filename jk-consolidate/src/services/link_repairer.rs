//! Recipe-link conflict repair
//!
//! Before duplicate links are repointed to a canonical ingredient, any recipe
//! holding more than one link into the canonical/duplicate set has to be
//! collapsed to a single link, or the repoint would violate
//! UNIQUE(recipe_id, ingredient_id).
//!
//! Per conflicting recipe:
//! 1. Order entries: canonical links first, then duplicate links, each by
//!    (position, id)
//! 2. Parse every amount; sum when all parsed amounts share a unit
//! 3. Keep the first entry (repointed to the canonical), write the merged
//!    quantity onto it, delete the rest
//!
//! Mismatched units are never combined: the first entry keeps its own
//! quantity and a warning is recorded. Each recipe is repaired inside its
//! own savepoint, so one bad recipe does not undo the others.

use sqlx::{Connection, SqliteConnection};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use jk_common::db::RecipeIngredientLink;
use jk_common::Result;

use super::quantity_parser::{format_amount, parse_quantity, QuantityParse};
use crate::db::recipe_links;
use crate::models::{RecipeRepairError, RepairStats};

/// Planned rewrite of one conflicting recipe
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeRepairPlan {
    pub recipe_id: String,
    /// Link kept and pointed at the canonical
    pub survivor_id: Uuid,
    pub amount: Option<String>,
    pub unit: Option<String>,
    /// Links deleted
    pub remove: Vec<Uuid>,
    pub amounts_merged: bool,
    pub warnings: Vec<String>,
}

/// Plan the repair of one recipe's links into a canonical/duplicate set
///
/// Returns `None` when the recipe holds fewer than two such links.
pub fn plan_recipe_repair(
    recipe_id: &str,
    links: &[RecipeIngredientLink],
    canonical_id: Uuid,
) -> Option<RecipeRepairPlan> {
    if links.len() < 2 {
        return None;
    }

    let mut ordered: Vec<&RecipeIngredientLink> = links.iter().collect();
    ordered.sort_by(|a, b| {
        let a_dup = a.ingredient_id != canonical_id;
        let b_dup = b.ingredient_id != canonical_id;
        a_dup
            .cmp(&b_dup)
            .then(a.position.cmp(&b.position))
            .then(a.id.cmp(&b.id))
    });

    let survivor = ordered[0];
    let mut warnings = Vec::new();

    let mut parsed: Vec<(&RecipeIngredientLink, f64, String)> = Vec::new();
    for &link in &ordered {
        match parse_quantity(link.amount.as_deref(), link.unit.as_deref()) {
            QuantityParse::Parsed { amount, unit } => parsed.push((link, amount, unit)),
            QuantityParse::NoValue => {}
            QuantityParse::Unparseable(raw) => warnings.push(format!(
                "recipe {}: unparseable amount '{}' excluded from merge",
                recipe_id, raw
            )),
        }
    }

    let units: BTreeSet<&str> = parsed.iter().map(|(_, _, unit)| unit.as_str()).collect();

    let (amount, unit, amounts_merged) = if parsed.is_empty() {
        (survivor.amount.clone(), survivor.unit.clone(), false)
    } else if units.len() > 1 {
        warnings.push(format!(
            "recipe {}: incompatible units ({}); kept first entry's quantity",
            recipe_id,
            units.iter().copied().collect::<Vec<_>>().join(", ")
        ));
        (survivor.amount.clone(), survivor.unit.clone(), false)
    } else if parsed.len() == 1 {
        let only = parsed[0].0;
        (only.amount.clone(), only.unit.clone(), false)
    } else {
        let total: f64 = parsed.iter().map(|(_, amount, _)| amount).sum();
        let (first, _, normalized) = &parsed[0];
        let unit = match first.unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) => Some(raw.to_string()),
            None if normalized != "each" => Some(normalized.clone()),
            None => None,
        };
        (Some(format_amount(total)), unit, true)
    };

    Some(RecipeRepairPlan {
        recipe_id: recipe_id.to_string(),
        survivor_id: survivor.id,
        amount,
        unit,
        remove: ordered[1..].iter().map(|link| link.id).collect(),
        amounts_merged,
        warnings,
    })
}

/// Resolves per-recipe link conflicts for a canonical/duplicate set
#[derive(Debug, Clone, Default)]
pub struct RecipeLinkRepairer;

impl RecipeLinkRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Plan every conflicting recipe among `links`
    pub fn plan(
        &self,
        links: &[RecipeIngredientLink],
        canonical_id: Uuid,
    ) -> (Vec<RecipeRepairPlan>, RepairStats) {
        let mut by_recipe: BTreeMap<&str, Vec<RecipeIngredientLink>> = BTreeMap::new();
        for link in links {
            by_recipe.entry(link.recipe_id.as_str()).or_default().push(link.clone());
        }

        let mut stats = RepairStats {
            recipes_analyzed: by_recipe.len(),
            ..Default::default()
        };
        let mut plans = Vec::new();

        for (recipe_id, recipe_links) in &by_recipe {
            if let Some(plan) = plan_recipe_repair(recipe_id, recipe_links, canonical_id) {
                stats.recipes_with_conflicts += 1;
                plans.push(plan);
            }
        }

        (plans, stats)
    }

    /// Repair conflicts on `conn` (normally inside the decision transaction)
    ///
    /// Per-recipe failures are collected in `RepairStats::errors`; only a
    /// failure to read the links is returned as an error.
    pub async fn repair(
        &self,
        conn: &mut SqliteConnection,
        canonical_id: Uuid,
        duplicate_ids: &[Uuid],
    ) -> Result<RepairStats> {
        let ids: Vec<Uuid> = std::iter::once(canonical_id)
            .chain(duplicate_ids.iter().copied())
            .collect();
        let links = recipe_links::links_for_ingredients(&mut *conn, &ids).await?;

        let (plans, mut stats) = self.plan(&links, canonical_id);

        for plan in plans {
            match apply_plan(conn, &plan, canonical_id).await {
                Ok(()) => {
                    stats.links_removed += plan.remove.len();
                    if plan.amounts_merged {
                        stats.amounts_merged += 1;
                    }
                    for warning in &plan.warnings {
                        tracing::warn!(recipe_id = %plan.recipe_id, "{}", warning);
                    }
                    stats.warnings.extend(plan.warnings);
                    tracing::debug!(
                        recipe_id = %plan.recipe_id,
                        survivor = %plan.survivor_id,
                        removed = plan.remove.len(),
                        amount = ?plan.amount,
                        unit = ?plan.unit,
                        "Repaired recipe links"
                    );
                }
                Err(e) => {
                    tracing::error!(recipe_id = %plan.recipe_id, error = %e, "Recipe link repair failed");
                    stats.errors.push(RecipeRepairError {
                        recipe_id: plan.recipe_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if stats.recipes_with_conflicts > 0 {
            tracing::info!(
                canonical = %canonical_id,
                "Link repair: {}",
                stats.display_string()
            );
        }

        Ok(stats)
    }
}

/// Apply one plan inside a savepoint
async fn apply_plan(
    conn: &mut SqliteConnection,
    plan: &RecipeRepairPlan,
    canonical_id: Uuid,
) -> Result<()> {
    let mut savepoint = conn.begin().await?;

    // Delete first: the survivor may be a duplicate link moving onto the canonical
    recipe_links::delete_links(&mut *savepoint, &plan.remove).await?;
    recipe_links::update_link(
        &mut *savepoint,
        plan.survivor_id,
        canonical_id,
        plan.amount.as_deref(),
        plan.unit.as_deref(),
    )
    .await?;

    savepoint.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(recipe: &str, ingredient: Uuid, amount: Option<&str>, unit: Option<&str>, position: i64) -> RecipeIngredientLink {
        RecipeIngredientLink::new(recipe, ingredient, amount, unit, position)
    }

    #[test]
    fn test_same_unit_amounts_are_summed() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", duplicate, Some("2"), Some("tablespoon"), 0),
            link("r1", canonical, Some("1"), Some("tablespoon"), 3),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.survivor_id, links[1].id);
        assert_eq!(plan.amount.as_deref(), Some("3"));
        assert_eq!(plan.unit.as_deref(), Some("tablespoon"));
        assert_eq!(plan.remove, vec![links[0].id]);
        assert!(plan.amounts_merged);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_unit_spellings_normalize_before_comparison() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", canonical, Some("1 1/2"), Some("Tbsp"), 0),
            link("r1", duplicate, Some("½"), Some("tablespoons"), 1),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.amount.as_deref(), Some("2"));
        assert_eq!(plan.unit.as_deref(), Some("Tbsp"));
    }

    #[test]
    fn test_mismatched_units_keep_first_entry() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", canonical, Some("1"), Some("cup"), 0),
            link("r1", duplicate, Some("2"), Some("each"), 1),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.amount.as_deref(), Some("1"));
        assert_eq!(plan.unit.as_deref(), Some("cup"));
        assert!(!plan.amounts_merged);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("incompatible units"));
    }

    #[test]
    fn test_no_value_entries_are_excluded_not_zero() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", canonical, Some("to taste"), None, 0),
            link("r1", duplicate, Some("2"), Some("tsp"), 1),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.survivor_id, links[0].id);
        assert_eq!(plan.amount.as_deref(), Some("2"));
        assert_eq!(plan.unit.as_deref(), Some("tsp"));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_only_recipe_keeps_first_duplicate() {
        let canonical = Uuid::new_v4();
        let dup_a = Uuid::new_v4();
        let dup_b = Uuid::new_v4();
        let links = vec![
            link("r1", dup_b, Some("1"), None, 4),
            link("r1", dup_a, Some("3"), None, 2),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.survivor_id, links[1].id);
        assert_eq!(plan.amount.as_deref(), Some("4"));
        assert_eq!(plan.unit, None);
    }

    #[test]
    fn test_unparseable_amount_warns() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", canonical, Some("a handful"), None, 0),
            link("r1", duplicate, Some("1"), Some("cup"), 1),
        ];

        let plan = plan_recipe_repair("r1", &links, canonical).unwrap();

        assert_eq!(plan.amount.as_deref(), Some("1"));
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_single_link_needs_no_plan() {
        let canonical = Uuid::new_v4();
        assert!(plan_recipe_repair("r1", &[link("r1", canonical, Some("1"), None, 0)], canonical).is_none());
    }

    #[test]
    fn test_plan_counts_recipes() {
        let canonical = Uuid::new_v4();
        let duplicate = Uuid::new_v4();
        let links = vec![
            link("r1", canonical, Some("1"), Some("cup"), 0),
            link("r1", duplicate, Some("1"), Some("cup"), 1),
            link("r2", duplicate, Some("1"), Some("cup"), 0),
        ];

        let (plans, stats) = RecipeLinkRepairer::new().plan(&links, canonical);

        assert_eq!(plans.len(), 1);
        assert_eq!(stats.recipes_analyzed, 2);
        assert_eq!(stats.recipes_with_conflicts, 1);
    }
}
