//! Decision execution
//!
//! One decision = one transaction:
//! repair conflicting recipe links → repoint remaining links → rewrite the
//! canonical's aliases and usage count → delete the duplicate rows.
//!
//! The transaction re-reads the rows it needs, so a decision whose
//! duplicates are already gone (a previous run got there first) is skipped
//! rather than failed, and aliases are rebuilt from current data.

use jk_common::db::Ingredient;
use jk_common::{Error, Result};
use uuid::Uuid;

use super::ConsolidationOrchestrator;
use crate::db::{ingredients, recipe_links};
use crate::models::{ConsolidationDecision, DecisionOutcome, DecisionReport, RepairStats};
use crate::services::alias_merger::build_alias_list;
use crate::utils::{begin_monitored, retry_on_lock};

impl ConsolidationOrchestrator {
    /// Execute one decision atomically, retrying on lock contention
    pub async fn execute_decision(&self, decision: &ConsolidationDecision) -> Result<DecisionReport> {
        retry_on_lock("execute_decision", self.max_lock_wait_ms, || {
            self.execute_decision_once(decision)
        })
        .await
    }

    async fn execute_decision_once(&self, decision: &ConsolidationDecision) -> Result<DecisionReport> {
        let mut tx = begin_monitored(&self.db, "execution::execute_decision").await?;
        let conn = &mut **tx.inner_mut();

        let rows = ingredients::load_ingredients_by_ids(&mut *conn, &decision.all_ids()).await?;
        let Some(canonical) = rows.iter().find(|i| i.id == decision.canonical_id).cloned() else {
            return Err(Error::NotFound(format!(
                "Canonical ingredient '{}' ({}) no longer exists",
                decision.canonical_name, decision.canonical_id
            )));
        };
        let duplicates: Vec<Ingredient> = rows.into_iter().filter(|i| i.id != canonical.id).collect();

        if duplicates.is_empty() {
            tx.rollback().await?;
            tracing::info!(
                group_id = %decision.group_id,
                canonical = %decision.canonical_name,
                "Duplicates already merged, skipping"
            );
            return Ok(DecisionReport {
                decision: decision.clone(),
                outcome: DecisionOutcome::Skipped {
                    reason: "duplicates already merged".to_string(),
                },
                repair: None,
            });
        }

        let duplicate_ids: Vec<Uuid> = duplicates.iter().map(|d| d.id).collect();

        // 1. Per-recipe conflicts must be gone before the repoint
        let repair = self
            .link_repairer
            .repair(&mut *conn, canonical.id, &duplicate_ids)
            .await?;
        if let Some(first) = repair.errors.first() {
            return Err(Error::Internal(format!(
                "link repair failed for {} recipe(s) (recipe {}: {})",
                repair.errors.len(),
                first.recipe_id,
                first.error
            )));
        }

        // 2. Remaining duplicate links move to the canonical
        let links_repointed = recipe_links::repoint_links(&mut *conn, &duplicate_ids, canonical.id).await?;

        // 3. Canonical absorbs names; usage recounted from the merged links
        let aliases = build_alias_list(&canonical, &duplicates);
        let usage_count = ingredients::count_recipes_using(&mut *conn, canonical.id).await?;
        ingredients::update_canonical(&mut *conn, canonical.id, &aliases, usage_count).await?;

        // 4. Duplicate rows
        let duplicates_removed = ingredients::delete_ingredients(&mut *conn, &duplicate_ids).await?;

        tx.commit().await?;

        tracing::info!(
            group_id = %decision.group_id,
            canonical = %canonical.name,
            duplicates_removed,
            links_repointed,
            links_removed = repair.links_removed,
            usage_count,
            "Decision executed"
        );

        Ok(DecisionReport {
            decision: decision.clone(),
            outcome: DecisionOutcome::Executed {
                duplicates_removed,
                links_repointed,
                usage_count,
            },
            repair: Some(repair),
        })
    }

    /// Link repair the decision would perform, computed read-only
    pub(super) async fn preview_decision(&self, decision: &ConsolidationDecision) -> Result<RepairStats> {
        let links = recipe_links::links_for_ingredients(&self.db, &decision.all_ids()).await?;
        let (plans, mut stats) = self.link_repairer.plan(&links, decision.canonical_id);

        for plan in plans {
            stats.links_removed += plan.remove.len();
            if plan.amounts_merged {
                stats.amounts_merged += 1;
            }
            stats.warnings.extend(plan.warnings);
        }

        Ok(stats)
    }

    /// Repair the decision's link conflicts without merging ingredient rows
    ///
    /// Per-recipe failures are collected in the returned stats; the other
    /// recipes' repairs still commit.
    pub(super) async fn repair_decision(&self, decision: &ConsolidationDecision) -> Result<RepairStats> {
        retry_on_lock("repair_decision", self.max_lock_wait_ms, || {
            self.repair_decision_once(decision)
        })
        .await
    }

    async fn repair_decision_once(&self, decision: &ConsolidationDecision) -> Result<RepairStats> {
        let mut tx = begin_monitored(&self.db, "execution::repair_decision").await?;
        let conn = &mut **tx.inner_mut();

        let rows = ingredients::load_ingredients_by_ids(&mut *conn, &decision.all_ids()).await?;
        if !rows.iter().any(|i| i.id == decision.canonical_id) {
            return Err(Error::NotFound(format!(
                "Canonical ingredient '{}' ({}) no longer exists",
                decision.canonical_name, decision.canonical_id
            )));
        }
        let duplicate_ids: Vec<Uuid> = rows
            .iter()
            .map(|i| i.id)
            .filter(|id| *id != decision.canonical_id)
            .collect();

        let stats = self
            .link_repairer
            .repair(&mut *conn, decision.canonical_id, &duplicate_ids)
            .await?;

        tx.commit().await?;
        Ok(stats)
    }
}
