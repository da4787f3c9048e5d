//! Consolidation run statistics
//!
//! Counters gathered during analysis and execution, carried in the run
//! report and printed as the run summary.

use serde::{Deserialize, Serialize};

use crate::models::RepairStats;

/// **Analysis Statistics**
///
/// Display: "N ingredients, X exact groups, Y variant clusters, Z decisions"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Ingredients loaded for analysis
    pub ingredients_analyzed: usize,
    /// Normalized-name groups with two or more members
    pub exact_groups: usize,
    /// Similarity clusters with two or more members
    pub variant_clusters: usize,
    /// Pairs scored during clustering
    pub candidate_pairs: usize,
    /// Pairs at or above the threshold
    pub similar_pairs: usize,
    /// Candidates refused by the alias merger or the comparator
    pub rejected_candidates: usize,
    /// Pairs sent to the semantic comparator
    pub semantic_comparisons: usize,
    /// Comparator answers that were fail-closed fallbacks
    pub semantic_fallbacks: usize,
    /// Groups where nothing qualified for merging
    pub kept_separate: usize,
    /// Merge decisions produced
    pub decisions: usize,
    pub duration_ms: u64,
}

impl AnalysisStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} ingredients, {} exact groups, {} variant clusters, {} decisions ({} candidates rejected, {} groups kept separate)",
            self.ingredients_analyzed,
            self.exact_groups,
            self.variant_clusters,
            self.decisions,
            self.rejected_candidates,
            self.kept_separate
        )
    }
}

/// **Execution Statistics**
///
/// Display: "X executed, Y skipped, Z failed; N duplicates removed, M links repointed"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub decisions_executed: usize,
    /// Already complete on a previous run
    pub decisions_skipped: usize,
    pub decisions_failed: usize,
    pub duplicates_removed: u64,
    pub links_repointed: u64,
    pub duration_ms: u64,
}

impl ExecutionStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} executed, {} skipped, {} failed; {} duplicates removed, {} links repointed",
            self.decisions_executed,
            self.decisions_skipped,
            self.decisions_failed,
            self.duplicates_removed,
            self.links_repointed
        )
    }
}

/// Aggregate statistics for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub analysis: AnalysisStats,
    pub execution: ExecutionStats,
    /// Link repair totals (planned totals on a dry run)
    pub repair: RepairStats,
    pub review_items: usize,
}

impl RunStatistics {
    /// Total warnings across link repair
    pub fn warnings(&self) -> usize {
        self.repair.warnings.len()
    }

    /// Multi-line summary for the console
    pub fn display_string(&self) -> String {
        format!(
            "Analysis: {}\nExecution: {}\nLink repair: {}\nWarnings: {}, review items: {}",
            self.analysis.display_string(),
            self.execution.display_string(),
            self.repair.display_string(),
            self.warnings(),
            self.review_items
        )
    }
}
