//! Select-column operation

use super::{first_capture, top_k, ProposeContext, TableOperation};
use crate::config::ApplyPolicy;
use crate::confidence::{ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::select_column_prompt;
use crate::state_machine::Operation;
use crate::table::{TableSnapshot, TraceEntry};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

static COLUMN_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)f_col\(\[(.*?)\]\)").expect("static pattern"));

/// Lowercased column names named by one completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSelection {
    /// Lowercased names
    pub columns: BTreeSet<String>,
}

impl ColumnSelection {
    /// Parse the argument list of `f_col([...])`
    #[must_use]
    pub fn parse_args(args: &str) -> Self {
        Self {
            columns: args
                .split(", ")
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

/// Select-column operation
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectColumn;

#[async_trait]
impl TableOperation for SelectColumn {
    type Candidate = ColumnSelection;

    fn operation(&self) -> Operation {
        Operation::SelectColumn
    }

    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<ColumnSelection>>, GeneratorError> {
        let prompt = select_column_prompt(ctx.snapshot, ctx.caption(), &ctx.task.statement);
        let completions = generator.complete(&prompt, ctx.options).await?;

        let mut tally = ConfidenceTally::new();
        for completion in &completions {
            if let Some(args) = first_capture(&COLUMN_CALL, &completion.text) {
                tally.add(ColumnSelection::parse_args(args), completion.log_score);
            }
        }
        debug!(
            "select_column parsed {} distinct selections from {} completions",
            tally.len(),
            completions.len()
        );
        Ok(tally.into_ranked())
    }

    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<ColumnSelection>],
        policy: &ApplyPolicy,
    ) -> TableSnapshot {
        if candidates.is_empty() {
            return snapshot.skipped(Operation::SelectColumn);
        }
        let wanted: BTreeSet<&str> = top_k(candidates, policy.union_top_k)
            .flat_map(|selection| selection.columns.iter().map(String::as_str))
            .collect();

        let kept: Vec<usize> = snapshot
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, header)| wanted.contains(header.to_lowercase().as_str()))
            .map(|(idx, _)| idx)
            .collect();

        if kept.is_empty() {
            debug!("select_column union matches no header, keeping all columns");
            return snapshot.unchanged(TraceEntry::kept(Operation::SelectColumn, "*"));
        }

        let names: Vec<&str> = kept.iter().map(|&idx| snapshot.headers()[idx].as_str()).collect();
        let entry = TraceEntry::kept(Operation::SelectColumn, names.join(", "));
        snapshot.with_columns(&kept, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableSnapshot {
        TableSnapshot::new(
            vec!["Season".into(), "Champions".into(), "Top Goalscorer".into()],
            vec![vec!["1993 - 94".into(), "sparta prague".into(), "horst siegl".into()]],
        )
        .unwrap()
    }

    #[test]
    fn matches_case_insensitively_in_table_order() {
        let candidates = vec![
            Ranked::new(ColumnSelection::parse_args("top goalscorer"), 2.0),
            Ranked::new(ColumnSelection::parse_args("SEASON"), 1.0),
        ];
        let next = SelectColumn.apply(&table(), &candidates, &ApplyPolicy::default());
        assert_eq!(next.headers(), &["Season".to_string(), "Top Goalscorer".to_string()]);
        assert_eq!(next.rows()[0], vec!["1993 - 94".to_string(), "horst siegl".to_string()]);
        assert_eq!(next.trace()[0].to_string(), "f_select_column(Season, Top Goalscorer)");
    }

    #[test]
    fn no_match_keeps_all_columns() {
        let candidates = vec![Ranked::new(ColumnSelection::parse_args("venue"), 1.0)];
        let base = table();
        let next = SelectColumn.apply(&base, &candidates, &ApplyPolicy::default());
        assert_eq!(next.headers(), base.headers());
        assert_eq!(next.trace()[0].to_string(), "f_select_column(*)");
        assert!(!next.trace()[0].skipped);
    }

    #[test]
    fn parse_lowercases_and_dedupes() {
        let selection = ColumnSelection::parse_args("Draw, draw, cardiff win");
        assert_eq!(selection.columns.len(), 2);
        assert!(selection.columns.contains("cardiff win"));
    }
}
