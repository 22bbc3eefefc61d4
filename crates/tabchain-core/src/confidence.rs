//! Soft-voting over repeated samples
//!
//! Completions that parse to the same canonical parameters pool their
//! `exp(log_score)`. The sums rank candidates; they are not probabilities.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// A value with its aggregated confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranked<T> {
    /// Candidate value
    pub value: T,
    /// Summed `exp(log_score)`
    pub confidence: f64,
}

impl<T> Ranked<T> {
    /// Create new ranked value
    #[inline]
    #[must_use]
    pub fn new(value: T, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

/// Accumulates confidence per canonical key
///
/// Insertion order is kept so ties rank by first appearance.
#[derive(Debug, Clone)]
pub struct ConfidenceTally<K: Eq + Hash> {
    entries: IndexMap<K, f64>,
}

impl<K: Eq + Hash> ConfidenceTally<K> {
    /// Create empty tally
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Add one completion's log score under `key`
    #[inline]
    pub fn add(&mut self, key: K, log_score: f64) {
        self.add_confidence(key, log_score.exp());
    }

    /// Add an already exponentiated confidence under `key`
    #[inline]
    pub fn add_confidence(&mut self, key: K, confidence: f64) {
        *self.entries.entry(key).or_insert(0.0) += confidence;
    }

    /// Number of distinct keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No key recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys ranked by descending confidence
    #[must_use]
    pub fn into_ranked(self) -> Vec<Ranked<K>> {
        let mut ranked: Vec<Ranked<K>> = self
            .entries
            .into_iter()
            .map(|(value, confidence)| Ranked::new(value, confidence))
            .collect();
        rank_descending(&mut ranked);
        ranked
    }
}

impl<K: Eq + Hash> Default for ConfidenceTally<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable sort by descending confidence
pub fn rank_descending<T>(ranked: &mut [Ranked<T>]) {
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_exp_scores_per_key() {
        let mut tally = ConfidenceTally::new();
        tally.add("a", 0.0);
        tally.add("b", 0.0);
        tally.add("a", 0.0);

        let ranked = tally.into_ranked();
        assert_eq!(ranked[0].value, "a");
        assert!((ranked[0].confidence - 2.0).abs() < 1e-12);
        assert!((ranked[1].confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let mut tally = ConfidenceTally::new();
        tally.add("late", 0.0);
        tally.add("early", 0.0);
        let ranked = tally.into_ranked();
        assert_eq!(ranked[0].value, "late");
    }

    #[test]
    fn sums_can_exceed_one() {
        let mut tally = ConfidenceTally::new();
        for _ in 0..8 {
            tally.add(1u8, 0.0);
        }
        assert!(tally.into_ranked()[0].confidence > 1.0);
    }
}
