//! Data models for consolidation runs

pub mod decision;
pub mod report;

pub use decision::{
    ConsolidationDecision, DecisionKind, KeptSeparate, Phase, RejectedCandidate, ReviewItem,
};
pub use report::{
    ConsolidationReport, DecisionOutcome, DecisionReport, GroupError, RecipeRepairError,
    RepairReport, RepairStats,
};
