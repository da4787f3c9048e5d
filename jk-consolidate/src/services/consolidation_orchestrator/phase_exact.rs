//! Exact phase: normalized-name duplicate groups
//!
//! Every member of an exact group shares one normalized name, so all of them
//! merge into the canonical. The survivors (canonicals, updated in memory as
//! if merged, plus ungrouped ingredients) feed the variant phase.

use std::collections::HashSet;
use uuid::Uuid;
use jk_common::db::Ingredient;
use jk_common::Result;

use super::{Analysis, ConsolidationOrchestrator};
use crate::db::recipe_links;
use crate::models::DecisionKind;
use crate::services::alias_merger::build_alias_list;
use crate::services::canonical_selector::select_canonical_ingredient;
use crate::services::similarity::find_exact_duplicates;

impl ConsolidationOrchestrator {
    /// Produce one decision per exact group; returns the would-be survivors
    pub(super) async fn phase_exact(
        &self,
        ingredients: Vec<Ingredient>,
        analysis: &mut Analysis,
    ) -> Result<Vec<Ingredient>> {
        let groups = find_exact_duplicates(&ingredients);
        analysis.stats.exact_groups = groups.len();

        tracing::info!(groups = groups.len(), "Phase: EXACT");

        let mut absorbed: HashSet<Uuid> = HashSet::new();
        let mut merged_canonicals: Vec<Ingredient> = Vec::new();

        for (index, group) in groups.iter().enumerate() {
            let Some(canonical) = select_canonical_ingredient(&group.members) else {
                continue;
            };
            let duplicates: Vec<Ingredient> = group
                .members
                .iter()
                .filter(|m| m.id != canonical.id)
                .cloned()
                .collect();
            let merged_aliases = build_alias_list(canonical, &duplicates);

            let decision = self
                .build_decision(
                    format!("exact-{}", index + 1),
                    DecisionKind::Exact,
                    canonical,
                    &duplicates,
                    merged_aliases.clone(),
                    Vec::new(),
                )
                .await?;

            tracing::debug!(
                group_id = %decision.group_id,
                canonical = %canonical.name,
                duplicates = ?decision.duplicate_names,
                affected_recipes = decision.affected_recipes,
                "Exact duplicate group"
            );

            // The survivor as it will look after execution
            let mut survivor = canonical.clone();
            survivor.aliases = merged_aliases;
            survivor.usage_count =
                recipe_links::count_recipes_referencing(&self.db, &decision.all_ids()).await?;

            absorbed.extend(decision.duplicate_ids.iter().copied());
            merged_canonicals.push(survivor);
            analysis.decisions.push(decision);
        }

        let merged_ids: HashSet<Uuid> = merged_canonicals.iter().map(|c| c.id).collect();
        let mut survivors: Vec<Ingredient> = ingredients
            .into_iter()
            .filter(|i| !absorbed.contains(&i.id) && !merged_ids.contains(&i.id))
            .collect();
        survivors.extend(merged_canonicals);

        Ok(survivors)
    }
}
