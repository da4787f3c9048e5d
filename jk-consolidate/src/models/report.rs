//! Run reports
//!
//! Serialized to JSON for the report file and the `consolidation_reports`
//! table, so every field is plain data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{ConsolidationDecision, KeptSeparate, Phase, ReviewItem};
use crate::services::consolidation_orchestrator::statistics::RunStatistics;

/// What happened to one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Dry run: nothing written
    Planned,
    /// Committed
    Executed {
        duplicates_removed: u64,
        links_repointed: u64,
        usage_count: i64,
    },
    /// Nothing left to do (duplicates already gone)
    Skipped { reason: String },
    /// Transaction rolled back
    Failed { error: String },
}

/// Decision plus its outcome and link-repair details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionReport {
    pub decision: ConsolidationDecision,
    pub outcome: DecisionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairStats>,
}

/// Group that failed without aborting the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupError {
    pub group_id: String,
    pub canonical_name: String,
    pub error: String,
}

/// Recipe whose conflicts could not be repaired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRepairError {
    pub recipe_id: String,
    pub error: String,
}

/// Link repair counters for one canonical/duplicate set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairStats {
    /// Recipes referencing any ingredient in the set
    pub recipes_analyzed: usize,
    /// Recipes with more than one link into the set
    pub recipes_with_conflicts: usize,
    pub links_removed: usize,
    /// Conflicts resolved by summing same-unit quantities
    pub amounts_merged: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<RecipeRepairError>,
}

impl RepairStats {
    pub fn absorb(&mut self, other: RepairStats) {
        self.recipes_analyzed += other.recipes_analyzed;
        self.recipes_with_conflicts += other.recipes_with_conflicts;
        self.links_removed += other.links_removed;
        self.amounts_merged += other.amounts_merged;
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} recipes analyzed, {} with conflicts, {} links removed, {} amounts merged, {} warnings, {} errors",
            self.recipes_analyzed,
            self.recipes_with_conflicts,
            self.links_removed,
            self.amounts_merged,
            self.warnings.len(),
            self.errors.len()
        )
    }
}

/// Report for a consolidation run (dry or executed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub report_id: String,
    pub phase: Phase,
    pub threshold: f64,
    pub executed: bool,
    /// Snapshot taken before the first mutation
    pub snapshot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub decisions: Vec<DecisionReport>,
    pub errors: Vec<GroupError>,
    /// Groups found but left untouched
    #[serde(default)]
    pub kept_separate: Vec<KeptSeparate>,
    pub review_items: Vec<ReviewItem>,
    pub statistics: RunStatistics,
}

impl ConsolidationReport {
    pub fn failed_groups(&self) -> usize {
        self.errors.len()
    }
}

/// Report for a standalone link repair run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub report_id: String,
    pub threshold: f64,
    pub executed: bool,
    pub snapshot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Canonical/duplicate sets considered
    pub groups: usize,
    pub stats: RepairStats,
    pub errors: Vec<GroupError>,
}
