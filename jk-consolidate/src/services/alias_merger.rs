//! Alias evaluation and merging
//!
//! Decides whether a duplicate's name may become an alias of the canonical
//! and builds the canonical's resulting alias list.
//!
//! A candidate is accepted outright when, after removing preparation
//! qualifiers, its words match the canonical's words exactly or by a plain
//! `s`/`es` plural. A candidate whose qualifier words differ from the
//! canonical's ("Roasted Red Peppers" vs "Red Bell Pepper") is rejected and
//! stays a separate ingredient. Everything else is inconclusive and goes to
//! the semantic comparator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use jk_common::db::Ingredient;

use super::similarity::normalize_name;
use crate::models::RejectedCandidate;

/// Preparation and state words that change what an ingredient is
pub const QUALIFIERS: &[&str] = &[
    "baked", "blanched", "boiled", "boneless", "candied", "canned", "caramelized", "chopped",
    "condensed", "cooked", "crushed", "crystallized", "cured", "dehydrated", "diced", "dried",
    "evaporated", "fermented", "fresh", "fried", "frozen", "grated", "grilled", "ground",
    "instant", "jarred", "julienned", "marinated", "mashed", "minced", "pickled", "powdered",
    "pureed", "raw", "roasted", "salted", "shredded", "skinless", "sliced", "smoked", "steamed",
    "sundried", "sweetened", "toasted", "unsalted", "unsweetened", "whipped",
];

/// Outcome of comparing one candidate name against the canonical name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AliasVerdict {
    /// Same words up to case, punctuation or a plain plural
    Accepted,
    /// Qualifier words differ; keep separate
    RejectedQualifier { qualifiers: Vec<String> },
    /// Needs semantic arbitration
    Inconclusive { reason: String },
}

/// Classify a candidate name relative to the canonical name
///
/// **Algorithm:**
/// 1. Identical normalized names → Accepted
/// 2. Qualifier sets differ (symmetric difference non-empty) → RejectedQualifier
/// 3. Remaining words equal in count and each pair equal or `s`/`es` plural → Accepted
/// 4. Otherwise → Inconclusive
pub fn evaluate_alias(canonical_name: &str, candidate_name: &str) -> AliasVerdict {
    let canonical = normalize_name(canonical_name);
    let candidate = normalize_name(candidate_name);
    if canonical == candidate {
        return AliasVerdict::Accepted;
    }

    let canonical_words: Vec<&str> = canonical.split(' ').filter(|w| !w.is_empty()).collect();
    let candidate_words: Vec<&str> = candidate.split(' ').filter(|w| !w.is_empty()).collect();

    let canonical_qualifiers = qualifier_set(&canonical_words);
    let candidate_qualifiers = qualifier_set(&candidate_words);
    let differing: Vec<String> = canonical_qualifiers
        .symmetric_difference(&candidate_qualifiers)
        .map(|q| q.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !differing.is_empty() {
        return AliasVerdict::RejectedQualifier {
            qualifiers: differing,
        };
    }

    let canonical_core: Vec<&str> = canonical_words.iter().copied().filter(|w| !is_qualifier(w)).collect();
    let candidate_core: Vec<&str> = candidate_words.iter().copied().filter(|w| !is_qualifier(w)).collect();

    if canonical_core.is_empty() || canonical_core.len() != candidate_core.len() {
        return AliasVerdict::Inconclusive {
            reason: format!(
                "word sets differ ('{}' vs '{}')",
                canonical_core.join(" "),
                candidate_core.join(" ")
            ),
        };
    }

    let mismatched: Vec<(&str, &str)> = canonical_core
        .iter()
        .zip(candidate_core.iter())
        .filter(|(a, b)| !plural_equivalent(a, b))
        .map(|(a, b)| (*a, *b))
        .collect();

    if mismatched.is_empty() {
        AliasVerdict::Accepted
    } else {
        AliasVerdict::Inconclusive {
            reason: format!(
                "words differ beyond plural form: {}",
                mismatched
                    .iter()
                    .map(|(a, b)| format!("{}/{}", a, b))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

fn is_qualifier(word: &str) -> bool {
    QUALIFIERS.binary_search(&word).is_ok()
}

fn qualifier_set<'a>(words: &[&'a str]) -> HashSet<&'a str> {
    words.iter().copied().filter(|w| is_qualifier(w)).collect()
}

/// Equal, or one is the other plus `s` or `es`
fn plural_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    match long.strip_prefix(short) {
        Some(suffix) => suffix == "s" || suffix == "es",
        None => false,
    }
}

/// Partition of a group relative to its canonical
#[derive(Debug, Clone, Default)]
pub struct AliasMergeResult {
    /// Merge without further checks
    pub accepted: Vec<Ingredient>,
    /// Stay separate
    pub rejected: Vec<RejectedCandidate>,
    /// Candidates with the reason they need arbitration
    pub inconclusive: Vec<(Ingredient, String)>,
    /// Canonical alias list if only `accepted` were merged
    pub aliases: Vec<String>,
}

/// Evaluate every non-canonical group member and compute the alias list
pub fn merge_aliases(canonical: &Ingredient, group: &[Ingredient]) -> AliasMergeResult {
    let mut result = AliasMergeResult::default();

    for member in group.iter().filter(|m| m.id != canonical.id) {
        match evaluate_alias(&canonical.name, &member.name) {
            AliasVerdict::Accepted => result.accepted.push(member.clone()),
            AliasVerdict::RejectedQualifier { qualifiers } => {
                tracing::debug!(
                    canonical = %canonical.name,
                    candidate = %member.name,
                    qualifiers = ?qualifiers,
                    "Alias rejected: qualifier mismatch"
                );
                result.rejected.push(RejectedCandidate {
                    ingredient_id: member.id,
                    name: member.name.clone(),
                    reason: format!("qualifier mismatch: {}", qualifiers.join(", ")),
                    qualifiers,
                });
            }
            AliasVerdict::Inconclusive { reason } => {
                result.inconclusive.push((member.clone(), reason));
            }
        }
    }

    result.aliases = build_alias_list(canonical, &result.accepted);
    result
}

/// Canonical alias list after absorbing `absorbed`
///
/// Existing aliases keep their order; new names (display names, names and
/// aliases of the absorbed ingredients) follow in sorted order. Duplicates
/// and the canonical's own names are dropped case-insensitively, so applying
/// the same merge twice yields the same list.
pub fn build_alias_list(canonical: &Ingredient, absorbed: &[Ingredient]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(canonical.name.trim().to_lowercase());
    seen.insert(canonical.display_name.trim().to_lowercase());

    let mut aliases = Vec::new();
    for alias in &canonical.aliases {
        let key = alias.trim().to_lowercase();
        if !key.is_empty() && seen.insert(key) {
            aliases.push(alias.trim().to_string());
        }
    }

    let additions: BTreeSet<String> = absorbed
        .iter()
        .flat_map(|i| {
            std::iter::once(i.display_name.as_str())
                .chain(std::iter::once(i.name.as_str()))
                .chain(i.aliases.iter().map(String::as_str))
        })
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    for name in additions {
        if seen.insert(name.to_lowercase()) {
            aliases.push(name);
        }
    }

    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifier_list_is_sorted() {
        let mut sorted = QUALIFIERS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, QUALIFIERS.to_vec());
    }

    #[test]
    fn test_plural_alias_accepted() {
        assert_eq!(evaluate_alias("Bean Sprout", "Bean Sprouts"), AliasVerdict::Accepted);
        assert_eq!(evaluate_alias("Peach", "Peaches"), AliasVerdict::Accepted);
        assert_eq!(evaluate_alias("Chive", "chive"), AliasVerdict::Accepted);
    }

    #[test]
    fn test_qualifier_mismatch_rejected() {
        assert_eq!(
            evaluate_alias("Red Bell Pepper", "Roasted Red Peppers"),
            AliasVerdict::RejectedQualifier {
                qualifiers: vec!["roasted".to_string()]
            }
        );
        assert_eq!(
            evaluate_alias("Salted Butter", "Unsalted Butter"),
            AliasVerdict::RejectedQualifier {
                qualifiers: vec!["salted".to_string(), "unsalted".to_string()]
            }
        );
    }

    #[test]
    fn test_shared_qualifier_is_not_a_mismatch() {
        assert_eq!(evaluate_alias("Dried Cranberry", "Dried Cranberries"), AliasVerdict::Inconclusive {
            reason: "words differ beyond plural form: cranberry/cranberries".to_string()
        });
        assert_eq!(evaluate_alias("Dried Fig", "Dried Figs"), AliasVerdict::Accepted);
    }

    #[test]
    fn test_spelling_variant_is_inconclusive() {
        assert!(matches!(
            evaluate_alias("Ancho Chili", "Ancho Chiles"),
            AliasVerdict::Inconclusive { .. }
        ));
        assert!(matches!(
            evaluate_alias("Scallion", "Green Onion"),
            AliasVerdict::Inconclusive { .. }
        ));
    }

    #[test]
    fn test_merge_aliases_partitions_group() {
        let canonical = Ingredient::new("Red Bell Pepper").with_usage_count(10);
        let group = vec![
            canonical.clone(),
            Ingredient::new("Red Bell Peppers"),
            Ingredient::new("Roasted Red Peppers"),
            Ingredient::new("Red Bel Pepper"),
        ];

        let result = merge_aliases(&canonical, &group);

        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].name, "Red Bell Peppers");
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].name, "Roasted Red Peppers");
        assert_eq!(result.inconclusive.len(), 1);
        assert_eq!(result.aliases, vec!["Red Bell Peppers"]);
    }

    #[test]
    fn test_alias_list_preserves_existing_and_dedupes() {
        let canonical = Ingredient::new("Chive").with_aliases(vec!["Chinese Chives".to_string()]);
        let absorbed = vec![
            Ingredient::new("Chives").with_aliases(vec!["chinese chives".to_string()]),
            Ingredient::new("CHIVE"),
        ];

        let aliases = build_alias_list(&canonical, &absorbed);
        assert_eq!(aliases, vec!["Chinese Chives", "Chives"]);

        // Re-applying the same merge changes nothing
        let updated = canonical.clone().with_aliases(aliases.clone());
        assert_eq!(build_alias_list(&updated, &absorbed), aliases);
    }
}
