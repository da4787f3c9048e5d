//! Variant phase: similarity clusters
//!
//! Each cluster is screened member by member against its canonical. Plain
//! plural/case variants merge directly, qualifier mismatches stay separate,
//! and inconclusive candidates go to the semantic comparator. A comparator
//! that cannot answer never causes a merge; the pair is listed for review.

use jk_common::db::Ingredient;
use jk_common::Result;

use super::{Analysis, ConsolidationOrchestrator, RunOptions};
use crate::models::{DecisionKind, KeptSeparate, RejectedCandidate, ReviewItem};
use crate::services::alias_merger::{build_alias_list, merge_aliases};
use crate::services::canonical_selector::select_canonical_ingredient;
use crate::services::similarity::cluster_variants_with_stats;

impl ConsolidationOrchestrator {
    /// Produce one decision per cluster with at least one accepted member
    pub(super) async fn phase_variant(
        &self,
        ingredients: &[Ingredient],
        options: &RunOptions,
        analysis: &mut Analysis,
    ) -> Result<()> {
        let (clusters, cluster_stats) = cluster_variants_with_stats(ingredients, options.threshold);
        analysis.stats.variant_clusters = clusters.len();
        analysis.stats.candidate_pairs = cluster_stats.candidate_pairs;
        analysis.stats.similar_pairs = cluster_stats.similar_pairs;

        tracing::info!(
            clusters = clusters.len(),
            candidate_pairs = cluster_stats.candidate_pairs,
            similar_pairs = cluster_stats.similar_pairs,
            "Phase: VARIANT"
        );

        for (index, cluster) in clusters.iter().enumerate() {
            let group_id = format!("variant-{}", index + 1);
            let Some(canonical) = select_canonical_ingredient(&cluster.members) else {
                continue;
            };

            let screened = merge_aliases(canonical, &cluster.members);
            let mut accepted = screened.accepted;
            let mut rejected = screened.rejected;

            for candidate in &rejected {
                tracing::warn!(
                    group_id = %group_id,
                    canonical = %canonical.name,
                    candidate = %candidate.name,
                    reason = %candidate.reason,
                    "Candidate kept separate"
                );
            }

            for (candidate, reason) in screened.inconclusive {
                match self
                    .arbitrate(&group_id, canonical, &candidate, &reason, options, analysis)
                    .await
                {
                    Some(rejection) => rejected.push(rejection),
                    None => accepted.push(candidate),
                }
            }

            analysis.stats.rejected_candidates += rejected.len();

            if accepted.is_empty() {
                analysis.stats.kept_separate += 1;
                tracing::info!(
                    group_id = %group_id,
                    canonical = %canonical.name,
                    "No candidate qualified, cluster kept separate"
                );
                analysis.kept_separate.push(KeptSeparate {
                    group_id,
                    canonical_id: canonical.id,
                    canonical_name: canonical.name.clone(),
                    rejected,
                });
                continue;
            }

            // Stable order for reports
            accepted.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            let merged_aliases = build_alias_list(canonical, &accepted);

            let decision = self
                .build_decision(
                    group_id,
                    DecisionKind::Variant,
                    canonical,
                    &accepted,
                    merged_aliases,
                    rejected,
                )
                .await?;

            tracing::debug!(
                group_id = %decision.group_id,
                canonical = %decision.canonical_name,
                duplicates = ?decision.duplicate_names,
                min_similarity = decision.min_similarity,
                "Variant group"
            );

            analysis.decisions.push(decision);
        }

        Ok(())
    }

    /// Settle an inconclusive candidate; `None` means merge it
    async fn arbitrate(
        &self,
        group_id: &str,
        canonical: &Ingredient,
        candidate: &Ingredient,
        heuristic_reason: &str,
        options: &RunOptions,
        analysis: &mut Analysis,
    ) -> Option<RejectedCandidate> {
        if !options.use_semantic {
            analysis.review_items.push(ReviewItem {
                canonical_name: canonical.name.clone(),
                candidate_name: candidate.name.clone(),
                reason: format!("inconclusive: {}", heuristic_reason),
            });
            return Some(RejectedCandidate {
                ingredient_id: candidate.id,
                name: candidate.name.clone(),
                reason: format!("inconclusive ({}), semantic check disabled", heuristic_reason),
                qualifiers: Vec::new(),
            });
        }

        analysis.stats.semantic_comparisons += 1;
        let verdict = self
            .comparator
            .semantic_compare(&canonical.name, &candidate.name)
            .await;

        if verdict.permits_merge(options.min_semantic_confidence) {
            tracing::debug!(
                group_id,
                canonical = %canonical.name,
                candidate = %candidate.name,
                confidence = verdict.confidence,
                "Semantic comparator accepted candidate"
            );
            return None;
        }

        if verdict.manual_review {
            analysis.stats.semantic_fallbacks += 1;
            tracing::warn!(
                group_id,
                canonical = %canonical.name,
                candidate = %candidate.name,
                reason = %verdict.reason,
                "Semantic comparator unavailable, kept separate and flagged for review"
            );
            analysis.review_items.push(ReviewItem {
                canonical_name: canonical.name.clone(),
                candidate_name: candidate.name.clone(),
                reason: verdict.reason.clone(),
            });
        } else {
            tracing::info!(
                group_id,
                canonical = %canonical.name,
                candidate = %candidate.name,
                similar = verdict.similar,
                confidence = verdict.confidence,
                "Semantic comparator kept candidate separate"
            );
        }

        Some(RejectedCandidate {
            ingredient_id: candidate.id,
            name: candidate.name.clone(),
            reason: format!(
                "semantic: {} (similar: {}, confidence {:.2})",
                verdict.reason, verdict.similar, verdict.confidence
            ),
            qualifiers: Vec::new(),
        })
    }
}
