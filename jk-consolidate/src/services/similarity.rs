//! Name normalization, similarity scoring and duplicate clustering
//!
//! Exact duplicates share a normalized name. Variants are clusters whose
//! members are all pairwise similar above a threshold (complete linkage), so
//! a chain A~B~C never pulls A and C together unless they are similar too.
//!
//! Candidate pairs come from a trigram index over the normalized words, so
//! only names sharing at least one trigram are ever scored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use jk_common::db::Ingredient;

/// Lowercase, drop apostrophes, turn other punctuation into spaces, collapse whitespace
pub fn normalize_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Crude English singular form of one lowercase word
pub fn singularize_word(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if word.len() > 4 {
            return format!("{}y", stem);
        }
    }
    for suffix in ["oes", "ches", "shes", "xes", "zes", "sses"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// Normalized name with every word singularized
pub fn singular_form(normalized: &str) -> String {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(singularize_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in [0, 1] between two display names
///
/// **Algorithm:**
/// 1. Normalize both names and order them lexicographically (symmetry)
/// 2. Score = mean of normalized Levenshtein and Jaro-Winkler
/// 3. Repeat on singularized forms; return the higher score
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    similarity_normalized(&a, &b)
}

fn similarity_normalized(a: &str, b: &str) -> f64 {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    if a.is_empty() {
        return 0.0;
    }

    let raw = combined_score(a, b);
    let singular_a = singular_form(a);
    let singular_b = singular_form(b);
    let singular = if singular_a == singular_b {
        1.0
    } else {
        let (sa, sb) = if singular_a <= singular_b {
            (singular_a.as_str(), singular_b.as_str())
        } else {
            (singular_b.as_str(), singular_a.as_str())
        };
        combined_score(sa, sb)
    };

    raw.max(singular).clamp(0.0, 1.0)
}

fn combined_score(a: &str, b: &str) -> f64 {
    0.5 * strsim::normalized_levenshtein(a, b) + 0.5 * strsim::jaro_winkler(a, b)
}

// ============================================================================
// Exact duplicates
// ============================================================================

/// Ingredients sharing one normalized name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub normalized_name: String,
    pub members: Vec<Ingredient>,
}

/// Group ingredients by normalized name; only groups of two or more are returned
///
/// Groups are ordered by normalized name and members by (name, id), so the
/// output does not depend on input order.
pub fn find_exact_duplicates(ingredients: &[Ingredient]) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<String, Vec<Ingredient>> = BTreeMap::new();
    for ingredient in ingredients {
        let key = normalize_name(&ingredient.name);
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(ingredient.clone());
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(normalized_name, mut members)| {
            members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            DuplicateGroup {
                normalized_name,
                members,
            }
        })
        .collect()
}

// ============================================================================
// Variant clustering
// ============================================================================

/// Ingredients whose every pair scores at or above the threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantCluster {
    pub members: Vec<Ingredient>,
    /// Lowest pairwise score inside the cluster
    pub min_similarity: f64,
}

/// Work counters from one clustering pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub ingredients: usize,
    /// Distinct pairs sharing at least one trigram
    pub candidate_pairs: usize,
    /// Pairs scoring at or above the threshold
    pub similar_pairs: usize,
}

/// Cluster near-duplicate names
pub fn cluster_variants(ingredients: &[Ingredient], threshold: f64) -> Vec<VariantCluster> {
    cluster_variants_with_stats(ingredients, threshold).0
}

/// Cluster near-duplicate names, also returning work counters
///
/// **Algorithm:**
/// 1. Sort by (normalized name, id) so results ignore input order
/// 2. Build a trigram index over normalized and singularized words
/// 3. Score every pair sharing a trigram; keep pairs >= threshold as edges
/// 4. Visit edges by score (desc), merging the two clusters only when every
///    cross pair is itself an edge
/// 5. Return clusters of two or more members
///
/// Names with identical normalized forms score 1.0; callers wanting exact
/// duplicates handled separately run [`find_exact_duplicates`] first.
pub fn cluster_variants_with_stats(
    ingredients: &[Ingredient],
    threshold: f64,
) -> (Vec<VariantCluster>, ClusterStats) {
    let mut items: Vec<(String, &Ingredient)> = ingredients
        .iter()
        .map(|i| (normalize_name(&i.name), i))
        .filter(|(normalized, _)| !normalized.is_empty())
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

    let mut stats = ClusterStats {
        ingredients: items.len(),
        ..Default::default()
    };

    // Trigram index
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, (normalized, _)) in items.iter().enumerate() {
        for gram in name_grams(normalized) {
            index.entry(gram).or_default().push(i);
        }
    }

    let mut candidates: BTreeSet<(usize, usize)> = BTreeSet::new();
    for postings in index.values() {
        for (offset, &i) in postings.iter().enumerate() {
            for &j in &postings[offset + 1..] {
                candidates.insert((i.min(j), i.max(j)));
            }
        }
    }
    stats.candidate_pairs = candidates.len();

    let mut edges: Vec<(f64, usize, usize)> = Vec::new();
    let mut scores: HashMap<(usize, usize), f64> = HashMap::new();
    for &(i, j) in &candidates {
        let score = similarity_normalized(&items[i].0, &items[j].0);
        if score >= threshold {
            edges.push((score, i, j));
            scores.insert((i, j), score);
        }
    }
    stats.similar_pairs = edges.len();

    edges.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    // Complete-linkage merge
    let mut cluster_of: Vec<usize> = (0..items.len()).collect();
    let mut clusters: Vec<Vec<usize>> = (0..items.len()).map(|i| vec![i]).collect();

    for &(_, i, j) in &edges {
        let (ci, cj) = (cluster_of[i], cluster_of[j]);
        if ci == cj {
            continue;
        }
        let fully_linked = clusters[ci].iter().all(|&a| {
            clusters[cj]
                .iter()
                .all(|&b| scores.contains_key(&(a.min(b), a.max(b))))
        });
        if !fully_linked {
            continue;
        }

        let (keep, absorb) = if clusters[ci].len() >= clusters[cj].len() {
            (ci, cj)
        } else {
            (cj, ci)
        };
        let moved = std::mem::take(&mut clusters[absorb]);
        for &member in &moved {
            cluster_of[member] = keep;
        }
        clusters[keep].extend(moved);
    }

    let mut result: Vec<VariantCluster> = clusters
        .into_iter()
        .filter(|members| members.len() >= 2)
        .map(|mut members| {
            members.sort_unstable();
            let mut min_similarity = 1.0f64;
            for (offset, &a) in members.iter().enumerate() {
                for &b in &members[offset + 1..] {
                    if let Some(score) = scores.get(&(a.min(b), a.max(b))) {
                        min_similarity = min_similarity.min(*score);
                    }
                }
            }
            VariantCluster {
                members: members.iter().map(|&m| items[m].1.clone()).collect(),
                min_similarity,
            }
        })
        .collect();

    // Members are in normalized-name order; order clusters by their first member
    result.sort_by(|a, b| {
        normalize_name(&a.members[0].name)
            .cmp(&normalize_name(&b.members[0].name))
            .then(a.members[0].id.cmp(&b.members[0].id))
    });

    tracing::debug!(
        ingredients = stats.ingredients,
        candidate_pairs = stats.candidate_pairs,
        similar_pairs = stats.similar_pairs,
        clusters = result.len(),
        threshold,
        "Variant clustering complete"
    );

    (result, stats)
}

/// Trigrams of every word (and its singular form); short words index whole
fn name_grams(normalized: &str) -> HashSet<String> {
    let mut grams = HashSet::new();
    for word in normalized.split(' ').filter(|w| !w.is_empty()) {
        let singular = singularize_word(word);
        for form in [word, singular.as_str()] {
            let chars: Vec<char> = form.chars().collect();
            if chars.len() < 3 {
                if chars.len() == 2 {
                    grams.insert(form.to_string());
                }
                continue;
            }
            for window in chars.windows(3) {
                grams.insert(window.iter().collect());
            }
        }
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cluster: &VariantCluster) -> Vec<&str> {
        cluster.members.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Baker's  Chocolate "), "bakers chocolate");
        assert_eq!(normalize_name("Half-and-Half"), "half and half");
        assert_eq!(normalize_name("JALAPEÑO, diced"), "jalapeño diced");
        assert_eq!(normalize_name("!!!"), "");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize_word("chives"), "chive");
        assert_eq!(singularize_word("tomatoes"), "tomato");
        assert_eq!(singularize_word("berries"), "berry");
        assert_eq!(singularize_word("peaches"), "peach");
        assert_eq!(singularize_word("asparagus"), "asparagus");
        assert_eq!(singularize_word("hummus"), "hummus");
        assert_eq!(singularize_word("egg"), "egg");
    }

    #[test]
    fn test_similarity_bounds_and_identity() {
        assert_eq!(calculate_similarity("Chive", "chive"), 1.0);
        assert_eq!(calculate_similarity("Chive", "Chives"), 1.0);
        let score = calculate_similarity("Basil", "Cumin");
        assert!((0.0..1.0).contains(&score));
        assert_eq!(calculate_similarity("", ""), 0.0);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let pairs = [
            ("Ancho Chili", "Ancho Chiles"),
            ("Salted Butter", "Unsalted Butter"),
            ("Red Bell Pepper", "Roasted Red Peppers"),
            ("Scallion", "Green Onion"),
        ];
        for (a, b) in pairs {
            assert_eq!(calculate_similarity(a, b), calculate_similarity(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_find_exact_duplicates() {
        let ingredients = vec![
            Ingredient::new("Green Onion"),
            Ingredient::new("green onion"),
            Ingredient::new("Green-Onion"),
            Ingredient::new("Basil"),
        ];

        let groups = find_exact_duplicates(&ingredients);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].normalized_name, "green onion");
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn test_cluster_singular_plural() {
        let ingredients = vec![
            Ingredient::new("Chive"),
            Ingredient::new("Chives"),
            Ingredient::new("Paprika"),
        ];

        let clusters = cluster_variants(&ingredients, 0.85);
        assert_eq!(clusters.len(), 1);
        assert_eq!(names(&clusters[0]), vec!["Chive", "Chives"]);
        assert_eq!(clusters[0].min_similarity, 1.0);
    }

    #[test]
    fn test_chain_does_not_drift() {
        let a = Ingredient::new("abcdefgh");
        let b = Ingredient::new("abcdefxy");
        let c = Ingredient::new("abcduvxy");

        let ab = calculate_similarity(&a.name, &b.name);
        let bc = calculate_similarity(&b.name, &c.name);
        let ac = calculate_similarity(&a.name, &c.name);
        let threshold = ab.min(bc);
        assert!(ac < threshold, "fixture must form a chain");

        let clusters = cluster_variants(&[a, b, c], threshold);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }

    #[test]
    fn test_clusters_are_complete_and_disjoint() {
        let ingredients: Vec<Ingredient> = [
            "Chive", "Chives", "Ancho Chili", "Ancho Chiles", "Ancho Chile",
            "Bean Sprout", "Bean Sprouts", "Salted Butter", "Unsalted Butter",
            "Tomato", "Tomatoes", "Tomatillo", "Basil", "Basil Leaves",
        ]
        .iter()
        .map(|n| Ingredient::new(*n))
        .collect();
        let threshold = 0.85;

        let clusters = cluster_variants(&ingredients, threshold);

        let mut seen = HashSet::new();
        for cluster in &clusters {
            for (offset, a) in cluster.members.iter().enumerate() {
                assert!(seen.insert(a.id), "{} appears in two clusters", a.name);
                for b in &cluster.members[offset + 1..] {
                    assert!(calculate_similarity(&a.name, &b.name) >= threshold);
                }
            }
        }
    }

    #[test]
    fn test_cluster_output_ignores_input_order() {
        let forward: Vec<Ingredient> = ["Scallion", "Scallions", "Chive", "Chives", "Dill"]
            .iter()
            .map(|n| Ingredient::new(*n))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let ids = |clusters: Vec<VariantCluster>| -> Vec<Vec<uuid::Uuid>> {
            clusters
                .into_iter()
                .map(|c| c.members.into_iter().map(|m| m.id).collect())
                .collect()
        };

        assert_eq!(
            ids(cluster_variants(&forward, 0.85)),
            ids(cluster_variants(&reversed, 0.85))
        );
    }

    #[test]
    fn test_candidate_pairs_stay_sub_quadratic() {
        // Deterministic pseudo-random four-letter words
        let mut state: u64 = 0x5eed;
        let mut next_word = || -> String {
            (0..4)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    (b'a' + ((state >> 33) % 26) as u8) as char
                })
                .collect()
        };
        let ingredients: Vec<Ingredient> = (0..2000)
            .map(|_| {
                let name = format!("{} {}", next_word(), next_word());
                Ingredient::new(name)
            })
            .collect();

        let (_, stats) = cluster_variants_with_stats(&ingredients, 0.85);
        let all_pairs = stats.ingredients * (stats.ingredients - 1) / 2;
        assert!(
            stats.candidate_pairs < all_pairs / 20,
            "{} candidates of {} pairs",
            stats.candidate_pairs,
            all_pairs
        );
    }
}
