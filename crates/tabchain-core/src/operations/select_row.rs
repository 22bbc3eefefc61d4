//! Select-row operation
//!
//! Candidates are sets of 1-based row ids or the wildcard. The top
//! candidate sets are unioned; a wildcard or an empty result keeps the
//! table as it is and records a skip.

use super::{first_capture, top_k, ProposeContext, TableOperation};
use crate::config::ApplyPolicy;
use crate::confidence::{ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::select_row_prompt;
use crate::state_machine::Operation;
use crate::table::{TableSnapshot, TraceEntry};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

static ROW_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)f_row\(\[(.*?)\]\)").expect("static pattern"));

/// Rows named by one completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowSelection {
    /// `*` was among the ids
    pub wildcard: bool,
    /// 1-based row ids
    pub rows: BTreeSet<usize>,
}

impl RowSelection {
    /// Parse the argument list of `f_row([...])`
    ///
    /// Each comma-separated item contributes its last word, so `row 5` and
    /// `5` both name row 5. Items that are neither a number nor `*` are
    /// ignored.
    #[must_use]
    pub fn parse_args(args: &str) -> Self {
        let mut selection = Self::default();
        for item in args.split(", ") {
            let id = item.trim().rsplit(' ').next().unwrap_or_default();
            if id == "*" {
                selection.wildcard = true;
            } else if let Ok(row) = id.parse::<usize>() {
                selection.rows.insert(row);
            }
        }
        selection
    }

    /// Union of several selections
    #[must_use]
    pub fn union<'a>(selections: impl IntoIterator<Item = &'a RowSelection>) -> Self {
        selections.into_iter().fold(Self::default(), |mut acc, s| {
            acc.wildcard |= s.wildcard;
            acc.rows.extend(s.rows.iter().copied());
            acc
        })
    }
}

/// Select-row operation
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectRow;

#[async_trait]
impl TableOperation for SelectRow {
    type Candidate = RowSelection;

    fn operation(&self) -> Operation {
        Operation::SelectRow
    }

    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<RowSelection>>, GeneratorError> {
        let prompt = select_row_prompt(ctx.snapshot, ctx.caption(), &ctx.task.statement);
        let completions = generator.complete(&prompt, ctx.options).await?;

        let mut tally = ConfidenceTally::new();
        for completion in &completions {
            if let Some(args) = first_capture(&ROW_CALL, &completion.text) {
                tally.add(RowSelection::parse_args(args), completion.log_score);
            }
        }
        debug!(
            "select_row parsed {} distinct selections from {} completions",
            tally.len(),
            completions.len()
        );
        Ok(tally.into_ranked())
    }

    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<RowSelection>],
        policy: &ApplyPolicy,
    ) -> TableSnapshot {
        if candidates.is_empty() {
            return snapshot.skipped(Operation::SelectRow);
        }
        let union = RowSelection::union(top_k(candidates, policy.union_top_k));
        if union.wildcard {
            debug!("select_row union contains wildcard");
            return snapshot.skipped(Operation::SelectRow);
        }

        let kept: Vec<usize> = (0..snapshot.row_count())
            .filter(|idx| union.rows.contains(&(idx + 1)))
            .collect();
        if kept.is_empty() {
            debug!("select_row union names no existing row");
            return snapshot.skipped(Operation::SelectRow);
        }

        let display: Vec<String> = (1..=kept.len()).map(|n| format!("row {n}")).collect();
        let audit: Vec<String> = kept.iter().map(|idx| format!("row {idx}")).collect();
        let entry = TraceEntry::kept(Operation::SelectRow, display.join(", ")).with_audit(audit.join(", "));
        snapshot.with_rows(&kept, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> TableSnapshot {
        TableSnapshot::new(
            vec!["team".into(), "score".into()],
            (1..=5)
                .map(|i| vec![format!("team {i}"), (i * 10).to_string()])
                .collect(),
        )
        .unwrap()
    }

    fn ranked(args: &str, confidence: f64) -> Ranked<RowSelection> {
        Ranked::new(RowSelection::parse_args(args), confidence)
    }

    #[test]
    fn parse_takes_last_word() {
        let selection = RowSelection::parse_args("row 5, row 1, 3, junk");
        assert!(!selection.wildcard);
        assert_eq!(selection.rows.into_iter().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert!(RowSelection::parse_args("*").wildcard);
    }

    #[test]
    fn unions_top_two_in_original_order() {
        let candidates = vec![ranked("row 4", 2.0), ranked("row 2", 1.0), ranked("row 1", 0.5)];
        let next = SelectRow.apply(&table(), &candidates, &ApplyPolicy::default());

        assert_eq!(next.rows()[0][0], "team 2");
        assert_eq!(next.rows()[1][0], "team 4");
        assert_eq!(next.row_count(), 2);
        let entry = &next.trace()[0];
        assert_eq!(entry.to_string(), "f_select_row(row 1, row 2)");
        assert_eq!(entry.audit(), "f_select_row(row 1, row 3)");
    }

    #[test]
    fn wildcard_in_union_is_skip() {
        let candidates = vec![ranked("row 1", 2.0), ranked("*", 1.0)];
        let base = table();
        let next = SelectRow.apply(&base, &candidates, &ApplyPolicy::default());
        assert_eq!(next.rows(), base.rows());
        assert_eq!(next.trace()[0].to_string(), "skip f_select_row()");
    }

    #[test]
    fn out_of_range_rows_never_empty_the_table() {
        let candidates = vec![ranked("row 9, row 0", 1.0)];
        let base = table();
        let next = SelectRow.apply(&base, &candidates, &ApplyPolicy::default());
        assert_eq!(next.row_count(), base.row_count());
        assert!(next.trace()[0].skipped);
    }

    #[test]
    fn third_candidate_is_not_unioned() {
        let candidates = vec![ranked("row 1", 3.0), ranked("row 2", 2.0), ranked("row 3", 1.0)];
        let next = SelectRow.apply(&table(), &candidates, &ApplyPolicy::default());
        assert_eq!(next.row_count(), 2);
    }
}
