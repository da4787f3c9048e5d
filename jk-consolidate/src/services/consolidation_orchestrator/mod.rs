//! Ingredient consolidation orchestrator
//!
//! Drives a run through analysis and (optionally) execution.
//!
//! # Flow
//! LOAD → EXACT → VARIANT → BACKUP → EXECUTE (per decision) → REPORT
//!
//! - **EXACT** (`phase_exact`): normalized-name groups
//! - **VARIANT** (`phase_variant`): similarity clusters over the exact
//!   survivors, with alias screening and semantic arbitration
//! - **EXECUTE** (`execution`): one transaction per decision
//!
//! Analysis never writes. Execution snapshots both tables first; if the
//! snapshot cannot be taken the run stops before any change. A failed
//! decision is recorded and the batch moves on.

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Instant;
use uuid::Uuid;
use jk_common::db::Ingredient;

use crate::db::{recipe_links, reports};
use crate::error::{ConsolidationError, Result};
use crate::models::{
    ConsolidationDecision, ConsolidationReport, DecisionKind, DecisionOutcome, DecisionReport,
    GroupError, KeptSeparate, Phase, RejectedCandidate, RepairReport, RepairStats, ReviewItem,
};
use crate::services::backup_manager::{BackupManager, SnapshotScope};
use crate::services::link_repairer::RecipeLinkRepairer;
use crate::services::semantic_comparator::ResilientComparator;
use crate::services::similarity::calculate_similarity;

mod execution;
mod phase_exact;
mod phase_variant;
pub mod statistics;

use statistics::{AnalysisStats, RunStatistics};

/// Default lock retry window when none is configured
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub phase: Phase,
    /// Minimum pairwise similarity for variant clustering
    pub threshold: f64,
    /// Minimum comparator confidence to accept an inconclusive candidate
    pub min_semantic_confidence: f64,
    /// `false` = dry run
    pub execute: bool,
    /// Consult the semantic comparator for inconclusive candidates
    pub use_semantic: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            phase: Phase::All,
            threshold: 0.85,
            min_semantic_confidence: 0.7,
            execute: false,
            use_semantic: true,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConsolidationError::InvalidOptions(format!(
                "threshold must be within (0.0, 1.0], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_semantic_confidence) {
            return Err(ConsolidationError::InvalidOptions(format!(
                "min_semantic_confidence must be within 0.0-1.0, got {}",
                self.min_semantic_confidence
            )));
        }
        Ok(())
    }
}

/// Read-only analysis output
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Exact decisions first, then variant decisions
    pub decisions: Vec<ConsolidationDecision>,
    pub kept_separate: Vec<KeptSeparate>,
    pub review_items: Vec<ReviewItem>,
    pub stats: AnalysisStats,
}

/// Consolidation orchestrator service
pub struct ConsolidationOrchestrator {
    db: SqlitePool,
    backup_manager: BackupManager,
    comparator: ResilientComparator,
    link_repairer: RecipeLinkRepairer,
    max_lock_wait_ms: u64,
}

impl ConsolidationOrchestrator {
    /// Create new orchestrator
    ///
    /// # Arguments
    /// * `db` - Database connection pool
    /// * `backup_manager` - Snapshot source taken before execution
    /// * `comparator` - Arbiter for inconclusive alias candidates
    pub fn new(db: SqlitePool, backup_manager: BackupManager, comparator: ResilientComparator) -> Self {
        Self {
            db,
            backup_manager,
            comparator,
            link_repairer: RecipeLinkRepairer::new(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Override how long a decision retries on "database is locked"
    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Compute decisions without writing anything
    pub async fn analyze(&self, options: &RunOptions) -> Result<Analysis> {
        options.validate()?;
        let start = Instant::now();

        let ingredients = crate::db::ingredients::load_all_ingredients(&self.db).await?;
        let mut analysis = Analysis::default();
        analysis.stats.ingredients_analyzed = ingredients.len();

        tracing::info!(
            phase = %options.phase,
            threshold = options.threshold,
            ingredients = ingredients.len(),
            "Analyzing ingredient vocabulary"
        );

        let survivors = if options.phase.includes_exact() {
            self.phase_exact(ingredients, &mut analysis).await?
        } else {
            ingredients
        };

        if options.phase.includes_variant() {
            self.phase_variant(&survivors, options, &mut analysis).await?;
        }

        analysis.stats.decisions = analysis.decisions.len();
        analysis.stats.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!("Analysis complete: {}", analysis.stats.display_string());

        Ok(analysis)
    }

    /// Analyze, then execute (or preview) every decision
    ///
    /// **Algorithm:**
    /// 1. Analyze
    /// 2. Execute mode with decisions: snapshot both tables (failure aborts the run)
    /// 3. Per decision: execute in its own transaction, or preview its link repair
    /// 4. Collect failures without stopping; persist the report
    pub async fn run(&self, options: &RunOptions) -> Result<ConsolidationReport> {
        let started_at = Utc::now();
        let report_id = new_report_id("consolidation");

        let analysis = self.analyze(options).await?;
        let snapshot_id = self
            .snapshot_before_execute(options, analysis.decisions.len(), "consolidation")
            .await?;

        let mut statistics = RunStatistics {
            analysis: analysis.stats,
            review_items: analysis.review_items.len(),
            ..Default::default()
        };
        let mut decisions = Vec::with_capacity(analysis.decisions.len());
        let mut errors = Vec::new();

        let execution_start = Instant::now();
        for decision in analysis.decisions {
            let result = if options.execute {
                self.execute_decision(&decision).await
            } else {
                self.preview_decision(&decision).await.map(|repair| DecisionReport {
                    decision: decision.clone(),
                    outcome: DecisionOutcome::Planned,
                    repair: Some(repair),
                })
            };

            match result {
                Ok(entry) => {
                    match &entry.outcome {
                        DecisionOutcome::Executed {
                            duplicates_removed,
                            links_repointed,
                            ..
                        } => {
                            statistics.execution.decisions_executed += 1;
                            statistics.execution.duplicates_removed += duplicates_removed;
                            statistics.execution.links_repointed += links_repointed;
                        }
                        DecisionOutcome::Skipped { .. } => statistics.execution.decisions_skipped += 1,
                        DecisionOutcome::Planned | DecisionOutcome::Failed { .. } => {}
                    }
                    if let Some(repair) = &entry.repair {
                        statistics.repair.absorb(repair.clone());
                    }
                    decisions.push(entry);
                }
                Err(e) => {
                    tracing::error!(
                        group_id = %decision.group_id,
                        canonical = %decision.canonical_name,
                        error = %e,
                        "Consolidation decision failed, continuing with remaining groups"
                    );
                    statistics.execution.decisions_failed += 1;
                    errors.push(GroupError {
                        group_id: decision.group_id.clone(),
                        canonical_name: decision.canonical_name.clone(),
                        error: e.to_string(),
                    });
                    decisions.push(DecisionReport {
                        decision,
                        outcome: DecisionOutcome::Failed { error: e.to_string() },
                        repair: None,
                    });
                }
            }
        }
        statistics.execution.duration_ms = execution_start.elapsed().as_millis() as u64;

        let report = ConsolidationReport {
            report_id,
            phase: options.phase,
            threshold: options.threshold,
            executed: options.execute,
            snapshot_id,
            started_at,
            ended_at: Some(Utc::now()),
            decisions,
            errors,
            kept_separate: analysis.kept_separate,
            review_items: analysis.review_items,
            statistics,
        };

        reports::save_consolidation_report(&self.db, &report).await?;

        tracing::info!(
            report_id = %report.report_id,
            executed = report.executed,
            snapshot_id = ?report.snapshot_id,
            failed_groups = report.failed_groups(),
            "Consolidation run complete: {}",
            report.statistics.execution.display_string()
        );

        Ok(report)
    }

    /// Resolve per-recipe link conflicts for every analyzed decision without
    /// merging ingredient rows
    pub async fn repair_links(&self, options: &RunOptions) -> Result<RepairReport> {
        let started_at = Utc::now();
        let report_id = new_report_id("repair");

        let analysis = self.analyze(options).await?;
        let snapshot_id = self
            .snapshot_before_execute(options, analysis.decisions.len(), "link repair")
            .await?;

        let mut stats = RepairStats::default();
        let mut errors = Vec::new();

        for decision in &analysis.decisions {
            let result = if options.execute {
                self.repair_decision(decision).await
            } else {
                self.preview_decision(decision).await
            };

            match result {
                Ok(group_stats) => stats.absorb(group_stats),
                Err(e) => {
                    tracing::error!(
                        group_id = %decision.group_id,
                        canonical = %decision.canonical_name,
                        error = %e,
                        "Link repair failed for group"
                    );
                    errors.push(GroupError {
                        group_id: decision.group_id.clone(),
                        canonical_name: decision.canonical_name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = RepairReport {
            report_id,
            threshold: options.threshold,
            executed: options.execute,
            snapshot_id,
            started_at,
            ended_at: Some(Utc::now()),
            groups: analysis.decisions.len(),
            stats,
            errors,
        };

        reports::save_repair_report(&self.db, &report).await?;

        tracing::info!(
            report_id = %report.report_id,
            executed = report.executed,
            "Link repair complete: {}",
            report.stats.display_string()
        );

        Ok(report)
    }

    /// Take the pre-execution snapshot; `None` on a dry run or with nothing to do
    async fn snapshot_before_execute(
        &self,
        options: &RunOptions,
        decision_count: usize,
        purpose: &str,
    ) -> Result<Option<String>> {
        if !options.execute {
            return Ok(None);
        }
        if decision_count == 0 {
            tracing::info!("No decisions to execute, skipping backup");
            return Ok(None);
        }

        let label = format!("before {} ({})", purpose, options.phase);
        match self
            .backup_manager
            .create_backup(SnapshotScope::IngredientsAndLinks, &label)
            .await
        {
            Ok(snapshot_id) => {
                tracing::info!(snapshot_id = %snapshot_id, "Backup created");
                Ok(Some(snapshot_id))
            }
            Err(e) => {
                tracing::error!(error = %e, "Backup failed, aborting run before any change");
                Err(ConsolidationError::BackupFailed(e))
            }
        }
    }

    /// Assemble a decision for `canonical` absorbing `duplicates`
    async fn build_decision(
        &self,
        group_id: String,
        kind: DecisionKind,
        canonical: &Ingredient,
        duplicates: &[Ingredient],
        merged_aliases: Vec<String>,
        rejected: Vec<RejectedCandidate>,
    ) -> jk_common::Result<ConsolidationDecision> {
        let duplicate_ids: Vec<Uuid> = duplicates.iter().map(|d| d.id).collect();
        let affected_recipes = recipe_links::count_recipes_referencing(&self.db, &duplicate_ids).await?;

        let min_similarity = match kind {
            DecisionKind::Exact => 1.0,
            DecisionKind::Variant => min_pairwise_similarity(canonical, duplicates),
        };

        Ok(ConsolidationDecision {
            group_id,
            kind,
            canonical_id: canonical.id,
            canonical_name: canonical.name.clone(),
            duplicate_ids,
            duplicate_names: duplicates.iter().map(|d| d.name.clone()).collect(),
            merged_aliases,
            affected_recipes,
            min_similarity,
            rejected,
        })
    }
}

/// Lowest score over every pair in canonical ∪ duplicates
fn min_pairwise_similarity(canonical: &Ingredient, duplicates: &[Ingredient]) -> f64 {
    let names: Vec<&str> = std::iter::once(canonical.name.as_str())
        .chain(duplicates.iter().map(|d| d.name.as_str()))
        .collect();

    let mut min = 1.0f64;
    for (offset, a) in names.iter().enumerate() {
        for b in &names[offset + 1..] {
            min = min.min(calculate_similarity(a, b));
        }
    }
    min
}

/// `<kind>-YYYYMMDDTHHMMSSmmm-<8 hex>`
fn new_report_id(kind: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", kind, Utc::now().format("%Y%m%dT%H%M%S%3f"), &random[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_validation() {
        assert!(RunOptions::default().validate().is_ok());

        let bad_threshold = RunOptions {
            threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_threshold.validate(),
            Err(ConsolidationError::InvalidOptions(_))
        ));

        let bad_confidence = RunOptions {
            min_semantic_confidence: 1.2,
            ..Default::default()
        };
        assert!(bad_confidence.validate().is_err());
    }

    #[test]
    fn test_min_pairwise_similarity_covers_all_pairs() {
        let canonical = Ingredient::new("Ancho Chile");
        let duplicates = vec![Ingredient::new("Ancho Chiles"), Ingredient::new("Ancho Chili")];

        let min = min_pairwise_similarity(&canonical, &duplicates);
        let expected = calculate_similarity("Ancho Chiles", "Ancho Chili")
            .min(calculate_similarity("Ancho Chile", "Ancho Chili"))
            .min(calculate_similarity("Ancho Chile", "Ancho Chiles"));
        assert_eq!(min, expected);
        assert_eq!(min_pairwise_similarity(&canonical, &[]), 1.0);
    }

    #[test]
    fn test_report_ids_are_unique() {
        let a = new_report_id("consolidation");
        let b = new_report_id("consolidation");
        assert!(a.starts_with("consolidation-"));
        assert_ne!(a, b);
    }
}
