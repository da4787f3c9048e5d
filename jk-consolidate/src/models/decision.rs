//! Consolidation decisions
//!
//! A decision names one canonical ingredient and the duplicates folded into
//! it. Decisions are computed read-only during analysis and applied one per
//! transaction during execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which detection passes a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Normalized-name duplicates only
    Exact,
    /// Similarity clusters only
    Variant,
    /// Exact first, then variant clustering over the survivors
    All,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Exact => "exact",
            Phase::Variant => "variant",
            Phase::All => "all",
        }
    }

    pub fn includes_exact(&self) -> bool {
        matches!(self, Phase::Exact | Phase::All)
    }

    pub fn includes_variant(&self) -> bool {
        matches!(self, Phase::Variant | Phase::All)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Phase::Exact),
            "variant" | "variants" => Ok(Phase::Variant),
            "all" => Ok(Phase::All),
            other => Err(format!(
                "unknown phase '{}' (expected exact, variant or all)",
                other
            )),
        }
    }
}

/// Detection pass that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Exact,
    Variant,
}

/// Candidate kept separate from its group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub ingredient_id: Uuid,
    pub name: String,
    pub reason: String,
    /// Qualifier words that differ from the canonical, if that was the cause
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<String>,
}

/// Pair left unresolved that a person should look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub canonical_name: String,
    pub candidate_name: String,
    pub reason: String,
}

/// Group where no candidate qualified for merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeptSeparate {
    pub group_id: String,
    pub canonical_id: Uuid,
    pub canonical_name: String,
    pub rejected: Vec<RejectedCandidate>,
}

/// One merge: `duplicate_ids` fold into `canonical_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationDecision {
    /// Stable group identifier within a run (`exact-3`, `variant-12`)
    pub group_id: String,
    pub kind: DecisionKind,
    pub canonical_id: Uuid,
    pub canonical_name: String,
    pub duplicate_ids: Vec<Uuid>,
    pub duplicate_names: Vec<String>,
    /// Alias list the canonical ends up with
    pub merged_aliases: Vec<String>,
    /// Distinct recipes referencing a duplicate at analysis time
    pub affected_recipes: i64,
    /// Lowest pairwise similarity within the group (1.0 for exact groups)
    pub min_similarity: f64,
    #[serde(default)]
    pub rejected: Vec<RejectedCandidate>,
}

impl ConsolidationDecision {
    /// Every ingredient the decision touches, canonical first
    pub fn all_ids(&self) -> Vec<Uuid> {
        std::iter::once(self.canonical_id)
            .chain(self.duplicate_ids.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parse() {
        assert_eq!("exact".parse::<Phase>().unwrap(), Phase::Exact);
        assert_eq!("Variants".parse::<Phase>().unwrap(), Phase::Variant);
        assert_eq!(" all ".parse::<Phase>().unwrap(), Phase::All);
        assert!("fuzzy".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_inclusion() {
        assert!(Phase::All.includes_exact() && Phase::All.includes_variant());
        assert!(!Phase::Exact.includes_variant());
        assert!(!Phase::Variant.includes_exact());
    }
}
