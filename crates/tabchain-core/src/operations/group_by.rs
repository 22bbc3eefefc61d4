//! Group-by operation
//!
//! Grouping never changes rows. It attaches a `(value, count)` side table
//! that only the final query renders. Near-unique columns are filtered at
//! propose time, so apply only checks that the column still exists.

use super::{first_capture, ProposeContext, TableOperation};
use crate::config::ApplyPolicy;
use crate::confidence::{rank_descending, ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::group_column_prompt;
use crate::state_machine::Operation;
use crate::table::{GroupFacts, TableSnapshot, TraceEntry};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

static GROUP_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"f_group\(([^)]*)\)").expect("static pattern"));

/// Highest distinct/populated ratio a groupable column may have
pub const MAX_DISTINCT_RATIO: f64 = 0.8;

/// A groupable column with its counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCandidate {
    /// Column to group
    pub column: String,
    /// `(value, count)` by descending count, ties in value order
    pub groups: Vec<(String, usize)>,
}

/// Whether the populated cells repeat enough to be worth grouping
///
/// Blank cells are ignored; a column with no populated cell is not groupable.
#[must_use]
pub fn is_groupable(values: &[&str]) -> bool {
    let populated: Vec<&str> = values.iter().copied().filter(|v| !v.trim().is_empty()).collect();
    if populated.is_empty() {
        return false;
    }
    let distinct: HashSet<&str> = populated.iter().copied().collect();
    #[allow(clippy::cast_precision_loss)]
    let ratio = distinct.len() as f64 / populated.len() as f64;
    ratio <= MAX_DISTINCT_RATIO
}

/// Counts per distinct value, blanks included, largest group first
#[must_use]
pub fn group_counts(values: &[&str]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(*value).or_insert(0) += 1;
    }
    let mut groups: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
}

/// Group-by operation
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupBy;

#[async_trait]
impl TableOperation for GroupBy {
    type Candidate = GroupCandidate;

    fn operation(&self) -> Operation {
        Operation::GroupColumn
    }

    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<GroupCandidate>>, GeneratorError> {
        let snapshot = ctx.snapshot;
        let prompt = group_column_prompt(snapshot, ctx.caption(), &ctx.task.statement);
        let completions = generator.complete(&prompt, ctx.options).await?;

        let mut tally = ConfidenceTally::new();
        for completion in &completions {
            match first_capture(&GROUP_CALL, &completion.text) {
                Some(column) if snapshot.column_index(column).is_some() => {
                    tally.add(column.to_string(), completion.log_score);
                }
                _ => {}
            }
        }

        let mut candidates: Vec<Ranked<GroupCandidate>> = tally
            .into_ranked()
            .into_iter()
            .filter_map(|ranked| {
                let index = snapshot.column_index(&ranked.value)?;
                let values = snapshot.column_values(index);
                if !is_groupable(&values) {
                    debug!("group_column {} is near-unique", ranked.value);
                    return None;
                }
                Some(Ranked::new(
                    GroupCandidate {
                        groups: group_counts(&values),
                        column: ranked.value,
                    },
                    ranked.confidence,
                ))
            })
            .collect();
        rank_descending(&mut candidates);
        debug!(
            "group_column kept {} candidates from {} completions",
            candidates.len(),
            completions.len()
        );
        Ok(candidates)
    }

    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<GroupCandidate>],
        _policy: &ApplyPolicy,
    ) -> TableSnapshot {
        let Some(top) = candidates.first() else {
            return snapshot.skipped(Operation::GroupColumn);
        };
        let candidate = &top.value;
        if snapshot.column_index(&candidate.column).is_none() {
            return snapshot.skipped(Operation::GroupColumn);
        }
        snapshot.with_group_facts(
            GroupFacts {
                column: candidate.column.clone(),
                groups: candidate.groups.clone(),
            },
            TraceEntry::kept(Operation::GroupColumn, candidate.column.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_unique_column_is_not_groupable() {
        let values = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "i"];
        assert!(!is_groupable(&values));
    }

    #[test]
    fn repetitive_column_is_groupable() {
        let values = ["x", "y", "x", "y", "x", "y", "x", "y", "x", "y"];
        assert!(is_groupable(&values));
    }

    #[test]
    fn blanks_are_ignored_by_ratio() {
        assert!(is_groupable(&["dem", "", " ", "dem", "rep"]));
        assert!(!is_groupable(&["", " "]));
    }

    #[test]
    fn counts_sorted_by_size_then_value() {
        let groups = group_counts(&["rep", "dem", "ind", "dem", "rep", "dem", ""]);
        assert_eq!(
            groups,
            vec![
                ("dem".to_string(), 3),
                ("rep".to_string(), 2),
                (String::new(), 1),
                ("ind".to_string(), 1),
            ]
        );
    }

    #[test]
    fn apply_attaches_facts_without_touching_rows() {
        let base = TableSnapshot::new(
            vec!["party".into()],
            vec![vec!["dem".into()], vec!["dem".into()], vec!["rep".into()]],
        )
        .unwrap();
        let candidate = GroupCandidate {
            column: "party".into(),
            groups: group_counts(&base.column_values(0)),
        };
        let next = GroupBy.apply(&base, &[Ranked::new(candidate, 1.0)], &ApplyPolicy::default());
        assert_eq!(next.rows(), base.rows());
        assert_eq!(next.group_facts().map(|f| f.groups.len()), Some(2));
        assert_eq!(next.trace()[0].to_string(), "f_group_column(party)");
    }
}
