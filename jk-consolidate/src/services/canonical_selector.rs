//! Canonical ingredient selection
//!
//! Picks the group member every other member is merged into. The choice is a
//! total order over ingredient fields, so the same group always yields the
//! same canonical regardless of the order it was loaded in.

use std::cmp::Ordering;
use jk_common::db::Ingredient;

/// Metadata fields present on an ingredient (0-3)
pub fn completeness_score(ingredient: &Ingredient) -> u8 {
    let mut score = 0;
    if ingredient.category.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        score += 1;
    }
    if !ingredient.aliases.is_empty() {
        score += 1;
    }
    if ingredient.is_common {
        score += 1;
    }
    score
}

/// Ordering where the preferred canonical sorts first
///
/// **Tie-break chain:**
/// 1. Higher usage_count
/// 2. Higher completeness score
/// 3. Earlier created_at
/// 4. Lexicographically smaller name
/// 5. Smaller id
pub fn canonical_order(a: &Ingredient, b: &Ingredient) -> Ordering {
    b.usage_count
        .cmp(&a.usage_count)
        .then_with(|| completeness_score(b).cmp(&completeness_score(a)))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Choose the canonical member of a duplicate group
///
/// Returns `None` only for an empty group.
pub fn select_canonical_ingredient(group: &[Ingredient]) -> Option<&Ingredient> {
    group.iter().min_by(|a, b| canonical_order(a, b))
}
