//! Text similarity strategies used by fuzzy resolution.
//!
//! A strategy maps two strings to a score in `[0, 1]`: higher means more
//! similar, `1.0` means identical after normalization. The resolver only ever
//! talks to the [`Similarity`] trait, so tests can inject a [`TableSimilarity`]
//! with exact scores.

use std::collections::{HashMap, HashSet};

/// Injected text-similarity strategy.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Trigram-overlap similarity with the same word padding and set semantics as
/// `PostgreSQL`'s `pg_trgm`.
///
/// Each alphanumeric word is lower-cased and padded as `"  word "`; the score is
/// `|A ∩ B| / |A ∪ B|` over the two trigram sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrigramSimilarity;

impl TrigramSimilarity {
    #[must_use]
    pub fn trigrams(text: &str) -> HashSet<String> {
        let mut set = HashSet::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
            for window in padded.windows(3) {
                set.insert(window.iter().collect());
            }
        }
        set
    }
}

impl Similarity for TrigramSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let left = Self::trigrams(a);
        let right = Self::trigrams(b);
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }
        let shared = left.intersection(&right).count();
        let union = left.len() + right.len() - shared;
        #[allow(clippy::cast_precision_loss)]
        let score = shared as f64 / union as f64;
        score
    }
}

/// Normalized Levenshtein similarity over case-folded, whitespace-collapsed
/// text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinSimilarity;

impl Similarity for LevenshteinSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = collapse(a);
        let b = collapse(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        strsim::normalized_levenshtein(&a, &b)
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic similarity for tests: explicit scores per unordered pair,
/// `1.0` for identical strings, and a default for everything else.
#[derive(Debug, Clone, Default)]
pub struct TableSimilarity {
    scores: HashMap<(String, String), f64>,
    default: f64,
}

impl TableSimilarity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, a: &str, b: &str, score: f64) -> Self {
        self.scores.insert(ordered(a, b), score);
        self
    }

    #[must_use]
    pub const fn with_default(mut self, score: f64) -> Self {
        self.default = score;
        self
    }
}

impl Similarity for TableSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.scores
            .get(&ordered(a, b))
            .copied()
            .unwrap_or(self.default)
    }
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn trigram_identical_is_one() {
        let s = TrigramSimilarity;
        assert!(close(
            s.score("Asian Development Bank", "asian development bank"),
            1.0
        ));
    }

    #[test]
    fn trigram_abbreviated_name_scores_high() {
        let s = TrigramSimilarity;
        let score = s.score(
            "KOREA INTERN. COOPERATION AGENCY",
            "Korea International Cooperation Agency",
        );
        assert!(close(score, 0.8378), "got {score}");
    }

    #[test]
    fn trigram_unrelated_is_low() {
        let s = TrigramSimilarity;
        assert!(s.score("KOICA", "Korea International Cooperation Agency") < 0.1);
        assert!(close(s.score("zzz", "World Bank"), 0.0));
    }

    #[test]
    fn trigram_empty_input_is_zero() {
        let s = TrigramSimilarity;
        assert!(close(s.score("", "World Bank"), 0.0));
        assert!(close(s.score("...", "..."), 0.0));
    }

    #[test]
    fn trigram_is_symmetric() {
        let s = TrigramSimilarity;
        let a = "World Bank";
        let b = "World Bank Group";
        assert!(close(s.score(a, b), s.score(b, a)));
        assert!(close(s.score(a, b), 0.6471));
    }

    #[test]
    fn levenshtein_ignores_case_and_spacing() {
        let s = LevenshteinSimilarity;
        assert!(close(s.score("World  Bank", "world bank"), 1.0));
        assert!(s.score("World Bank", "Wrld Bank") > 0.8);
    }

    #[test]
    fn table_similarity_is_order_insensitive() {
        let s = TableSimilarity::new().with("a", "b", 0.82).with_default(0.1);
        assert!(close(s.score("b", "a"), 0.82));
        assert!(close(s.score("a", "c"), 0.1));
        assert!(close(s.score("c", "c"), 1.0));
    }
}
