//! Add-column operation
//!
//! The proposal names a new column and gives its values for the preview
//! rows. The explanation of the winning proposal then seeds one greedy
//! follow-up call per remaining row, so the column is filled by extending
//! a single line of reasoning rather than by independent resampling.

use super::{first_capture, ProposeContext, TableOperation};
use crate::config::ApplyPolicy;
use crate::confidence::{ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::{complete_text, GenerationOptions, Generator};
use crate::prompts::{
    add_column_follow_up_header, add_column_prompt, ADD_COLUMN_EXPLANATION_MARKER,
    ADD_COLUMN_VALUE_MARKER, PREVIEW_ROWS,
};
use crate::state_machine::Operation;
use crate::table::{TableSnapshot, TraceEntry};
use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static ADD_COLUMN_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"f_add_column\(([^)]*)\)").expect("static pattern"));

/// Column names with this prefix are counts, which add-column cannot derive
const COUNT_PREFIX: &str = "number of";

/// A fully derived column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddColumnCandidate {
    /// New column name
    pub column: String,
    /// One value per row
    pub values: Vec<String>,
}

/// Parsed first-stage completion
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedProposal {
    column: String,
    preview: Vec<String>,
    /// Completion text from the explanation marker to the end
    seed: String,
    /// Explanation up to and including the value marker
    explanation: String,
}

fn parse_proposal(text: &str, preview_len: usize) -> Option<ParsedProposal> {
    let column = first_capture(&ADD_COLUMN_CALL, text)?.to_string();

    let (_, values) = text.rsplit_once(ADD_COLUMN_VALUE_MARKER)?;
    let preview: Vec<String> = values.trim().split('|').map(|v| v.trim().to_string()).collect();
    if preview.len() != preview_len {
        return None;
    }

    let left = text.find(ADD_COLUMN_EXPLANATION_MARKER)?;
    let right = text.find(ADD_COLUMN_VALUE_MARKER)?;
    if left >= right {
        return None;
    }

    Some(ParsedProposal {
        column,
        preview,
        seed: text[left..].to_string(),
        explanation: format!("{}{ADD_COLUMN_VALUE_MARKER}", &text[left..right]),
    })
}

/// Value of one follow-up response: text before the first `|`
fn follow_up_value(response: &str) -> String {
    let response = response.trim();
    match response.split_once('|') {
        Some((value, _)) => value.trim().to_string(),
        None => response.to_string(),
    }
}

/// Why a derived column was refused, if it was
fn rejection(snapshot: &TableSnapshot, candidate: &AddColumnCandidate) -> Option<&'static str> {
    let values = &candidate.values;
    if values.len() != snapshot.row_count() {
        return Some("value count differs from row count");
    }
    if candidate.column.starts_with(COUNT_PREFIX) {
        return Some("count column");
    }
    if values.first().is_some_and(|first| values.iter().all(|v| v == first)) {
        return Some("all values identical");
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Some("empty value");
    }
    if snapshot.column_index(&candidate.column).is_some() {
        return Some("column name exists");
    }

    let columns: Vec<Vec<&str>> = (0..snapshot.headers().len())
        .map(|idx| snapshot.column_values(idx))
        .collect();
    if columns
        .iter()
        .any(|column| column.iter().zip(values).all(|(cell, value)| *cell == value.as_str()))
    {
        return Some("values duplicate an existing column");
    }
    let extracted = columns
        .iter()
        .any(|column| column.iter().zip(values).all(|(cell, value)| cell.contains(value.as_str())));
    if !extracted {
        return Some("values are not substrings of any column");
    }
    None
}

/// Add-column operation
#[derive(Debug, Clone, Copy, Default)]
pub struct AddColumn;

#[async_trait]
impl TableOperation for AddColumn {
    type Candidate = AddColumnCandidate;

    fn operation(&self) -> Operation {
        Operation::AddColumn
    }

    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<AddColumnCandidate>>, GeneratorError> {
        let snapshot = ctx.snapshot;
        let preview_len = snapshot.row_count().min(PREVIEW_ROWS);
        let statement = collapse_digits(ctx.task.add_column_statement());
        let prompt = add_column_prompt(snapshot, ctx.caption(), &statement);
        let completions = generator.complete(&prompt, ctx.options).await?;

        let mut tally = ConfidenceTally::new();
        let mut seeds: IndexMap<(String, Vec<String>), ParsedProposal> = IndexMap::new();
        for completion in &completions {
            let Some(parsed) = parse_proposal(&completion.text, preview_len) else {
                continue;
            };
            let key = (parsed.column.clone(), parsed.preview.clone());
            tally.add(key.clone(), completion.log_score);
            seeds.entry(key).or_insert(parsed);
        }
        debug!(
            "add_column parsed {} of {} completions",
            seeds.len(),
            completions.len()
        );

        let Some(top) = tally.into_ranked().into_iter().next() else {
            return Ok(Vec::new());
        };
        let Some(parsed) = seeds.swap_remove(&top.value) else {
            return Ok(Vec::new());
        };
        if snapshot.column_index(&parsed.column).is_some() {
            debug!("add_column proposed existing column {}", parsed.column);
            return Ok(Vec::new());
        }

        let headers = snapshot.headers();
        let rows = snapshot.rows();
        let mut base = add_column_follow_up_header(headers, rows, ctx.caption());
        base.push_str(&parsed.seed);

        let follow_up_options = GenerationOptions::greedy(ctx.options.max_output_tokens);
        let mut values = parsed.preview;
        for row in &rows[preview_len..] {
            let mut prompt = base.clone();
            prompt.push_str("\n\n");
            prompt.push_str(&add_column_follow_up_header(
                headers,
                std::slice::from_ref(row),
                ctx.caption(),
            ));
            prompt.push_str(&parsed.explanation);
            let response = complete_text(generator, &prompt, &follow_up_options).await?;
            values.push(follow_up_value(&response));
        }

        Ok(vec![Ranked::new(
            AddColumnCandidate {
                column: parsed.column,
                values,
            },
            top.confidence,
        )])
    }

    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<AddColumnCandidate>],
        _policy: &ApplyPolicy,
    ) -> TableSnapshot {
        let Some(top) = candidates.first() else {
            return snapshot.skipped(Operation::AddColumn);
        };
        let candidate = &top.value;
        if let Some(reason) = rejection(snapshot, candidate) {
            debug!("add_column {} rejected: {}", candidate.column, reason);
            return snapshot.skipped(Operation::AddColumn);
        }
        snapshot.with_column(
            &candidate.column,
            candidate.values.clone(),
            TraceEntry::kept(Operation::AddColumn, candidate.column.clone()),
        )
    }
}

/// Replace every run of ASCII digits with `_`
#[must_use]
pub fn collapse_digits(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut in_digits = false;
    for c in statement.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('_');
            }
            in_digits = true;
        } else {
            out.push(c);
            in_digits = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Completion;
    use crate::types::{RawTable, Task};
    use std::sync::Mutex;

    fn matches_table() -> TableSnapshot {
        TableSnapshot::new(
            vec!["match".into(), "date".into()],
            vec![
                vec!["1".into(), "15 august".into()],
                vec!["2".into(), "22 july".into()],
                vec!["3".into(), "29 september".into()],
                vec!["4".into(), "3 october".into()],
            ],
        )
        .unwrap()
    }

    fn candidate(column: &str, values: &[&str]) -> Vec<Ranked<AddColumnCandidate>> {
        vec![Ranked::new(
            AddColumnCandidate {
                column: column.into(),
                values: values.iter().map(ToString::to_string).collect(),
            },
            1.0,
        )]
    }

    const PROPOSAL: &str = "To tell this statement is true or false, we need to know the month of each match. \
We extract the value from column \"date\" and create a different column \"month\" for each row. \
The datatype is datetype.\nTherefore, the answer is: f_add_column(month). The value: august | july | september";

    #[derive(Default)]
    struct MonthGenerator {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for MonthGenerator {
        async fn complete(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<Vec<Completion>, GeneratorError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            if prompt.ends_with(ADD_COLUMN_VALUE_MARKER) {
                Ok(vec![Completion::new(" october | ignored", 0.0)])
            } else {
                Ok(vec![Completion::new(PROPOSAL, 0.0)])
            }
        }
    }

    #[tokio::test]
    async fn propose_fills_remaining_rows_with_follow_ups() {
        let snapshot = matches_table();
        let task = Task::new(
            "t",
            RawTable::new(snapshot.headers().to_vec(), snapshot.rows().to_vec()),
            "they play 5 times in august",
        );
        let options = GenerationOptions::greedy(150);
        let generator = MonthGenerator::default();
        let ctx = ProposeContext::new(&task, &snapshot, &options);

        let ranked = AddColumn.propose(&generator, &ctx).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].value.column, "month");
        assert_eq!(ranked[0].value.values, vec!["august", "july", "september", "october"]);

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("Statement: they play _ times in august\n"));
        assert!(calls[1].contains("row 1 : 4 | 3 october\n*/\nExplanation: We extract the value from"));
    }

    #[test]
    fn parse_requires_exact_preview_length() {
        assert!(parse_proposal(PROPOSAL, 3).is_some());
        assert!(parse_proposal(PROPOSAL, 2).is_none());
        assert!(parse_proposal("f_add_column(x). The value: a | b | c", 3).is_none());
    }

    #[test]
    fn accepts_substring_extraction() {
        let base = matches_table();
        let next = AddColumn.apply(
            &base,
            &candidate("month", &["august", "july", "september", "october"]),
            &ApplyPolicy::default(),
        );
        assert_eq!(next.headers().last().map(String::as_str), Some("month"));
        assert_eq!(next.trace()[0].to_string(), "f_add_column(month)");
        assert!(next.check_invariants().is_ok());
    }

    #[test]
    fn rejects_identical_values() {
        let base = TableSnapshot::new(
            vec!["name".into()],
            vec![vec!["a x".into()], vec!["a y".into()], vec!["a z".into()]],
        )
        .unwrap();
        let next = AddColumn.apply(&base, &candidate("letter", &["a", "a", "a"]), &ApplyPolicy::default());
        assert_eq!(next.trace()[0].to_string(), "skip f_add_column()");
        assert_eq!(next.headers(), base.headers());
    }

    #[test]
    fn rejects_count_columns_and_non_extractions() {
        let base = matches_table();
        let policy = ApplyPolicy::default();
        let counted = AddColumn.apply(&base, &candidate("number of games", &["1", "2", "3", "4"]), &policy);
        assert!(counted.trace()[0].skipped);

        let invented = AddColumn.apply(&base, &candidate("month", &["may", "july", "september", "october"]), &policy);
        assert!(invented.trace()[0].skipped);

        let copied = AddColumn.apply(&base, &candidate("id", &["1", "2", "3", "4"]), &policy);
        assert!(copied.trace()[0].skipped);

        let existing = AddColumn.apply(&base, &candidate("date", &["august", "july", "september", "october"]), &policy);
        assert!(existing.trace()[0].skipped);

        let blank = AddColumn.apply(&base, &candidate("month", &["august", " ", "september", "october"]), &policy);
        assert!(blank.trace()[0].skipped);
    }

    #[test]
    fn substring_heuristic_accepts_loose_matches() {
        let base = TableSnapshot::new(
            vec!["year".into()],
            vec![vec!["1950".into()], vec!["1961".into()]],
        )
        .unwrap();
        let next = AddColumn.apply(&base, &candidate("digit", &["5", "6"]), &ApplyPolicy::default());
        assert!(!next.trace()[0].skipped);
    }

    #[test]
    fn collapse_digits_replaces_runs() {
        assert_eq!(collapse_digits("kwale had 649,931 in 2009"), "kwale had _,_ in _");
    }

    #[test]
    fn follow_up_value_takes_first_cell() {
        assert_eq!(follow_up_value(" kaz | ind "), "kaz");
        assert_eq!(follow_up_value(" jpn\n"), "jpn");
    }
}
