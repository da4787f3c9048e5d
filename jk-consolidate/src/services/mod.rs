//! Service modules for ingredient consolidation
//!
//! Leaf services first: similarity, canonical selection, alias screening,
//! quantity parsing, semantic comparison, link repair and backups. The
//! orchestrator drives them.

pub mod alias_merger;
pub mod backup_manager;
pub mod canonical_selector;
pub mod consolidation_orchestrator;
pub mod link_repairer;
pub mod quantity_parser;
pub mod semantic_comparator;
pub mod similarity;

pub use alias_merger::{evaluate_alias, merge_aliases, AliasMergeResult, AliasVerdict};
pub use backup_manager::{
    BackupError, BackupManager, RollbackReport, SnapshotInfo, SnapshotRepository, SnapshotScope,
    SqliteSnapshotRepository,
};
pub use canonical_selector::select_canonical_ingredient;
pub use consolidation_orchestrator::{Analysis, ConsolidationOrchestrator, RunOptions};
pub use link_repairer::{RecipeLinkRepairer, RecipeRepairPlan};
pub use quantity_parser::{parse_quantity, QuantityParse};
pub use semantic_comparator::{
    ComparatorError, HeuristicComparator, HttpSemanticComparator, ResilientComparator,
    SemanticComparator, SemanticVerdict,
};
pub use similarity::{calculate_similarity, cluster_variants, find_exact_duplicates};
