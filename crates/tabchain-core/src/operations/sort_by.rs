//! Sort-by operation
//!
//! Propose parses `(column, direction, datatype)` and precomputes the row
//! permutation against the current snapshot. Candidates whose column is
//! already ordered in the proposed direction are dropped there. Apply
//! commits the top candidate only if the policy's datatype filter allows it.

use super::{first_capture, ProposeContext, TableOperation};
use crate::config::{ApplyPolicy, SortFilter};
use crate::confidence::{ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::sort_column_prompt;
use crate::state_machine::Operation;
use crate::table::{SortFacts, SortValue, TableSnapshot, TraceEntry};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

static DATATYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"The datatype is (\w*)").expect("static pattern"));
static ORDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)the order is "(.*)"\."#).expect("static pattern"));
static SORT_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"f_sort\((.*)\)").expect("static pattern"));

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// "small to large"
    Ascending,
    /// "large to small"
    Descending,
}

impl SortDirection {
    /// Parse the quoted order phrase
    #[must_use]
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        match phrase.trim() {
            "small to large" => Some(Self::Ascending),
            "large to small" => Some(Self::Descending),
            _ => None,
        }
    }
}

/// Inferred datatype of the sort column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Sorted by normalized number
    Numeric,
    /// Sorted as trimmed text
    DateLike,
    /// Sorted as trimmed text
    Text,
}

impl DataType {
    /// Map the completion's datatype word
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "numerical" | "numeric" => Self::Numeric,
            "datetype" | "date" => Self::DateLike,
            _ => Self::Text,
        }
    }
}

/// A committed-ready sort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortCandidate {
    /// Sort column
    pub column: String,
    /// Direction
    pub direction: SortDirection,
    /// Datatype used for the keys
    pub datatype: DataType,
    /// 0-based row permutation, rows without a key last
    pub order: Vec<usize>,
    /// Largest key
    pub max: SortValue,
    /// Smallest key
    pub min: SortValue,
}

/// Keep digits and the first `.`; one leading `-` marks a negative number
///
/// Returns an empty string for values with no digits or with more than one
/// leading `-`.
#[must_use]
pub fn normalize_numeric(value: &str) -> String {
    let trimmed = value.trim();
    let leading_minus = trimmed.chars().take_while(|c| *c == '-').count();
    if leading_minus > 1 {
        return String::new();
    }

    let mut digits = String::new();
    let mut seen_dot = false;
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == '.' && !seen_dot {
            digits.push(c);
            seen_dot = true;
        }
    }
    if digits.is_empty() || digits == "." {
        return String::new();
    }
    if leading_minus == 1 {
        digits.insert(0, '-');
    }
    digits
}

fn sort_key(cell: &str, datatype: DataType) -> Option<SortValue> {
    match datatype {
        DataType::Numeric => normalize_numeric(cell).parse().ok().map(SortValue::Number),
        DataType::DateLike | DataType::Text => {
            let trimmed = cell.trim();
            (!trimmed.is_empty()).then(|| SortValue::Text(trimmed.to_string()))
        }
    }
}

fn compare(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
        (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
    }
}

/// Row permutation and key extremes for one column
///
/// `None` when no cell yields a key, or when the keys are already ordered in
/// `direction` (the sort would be a no-op).
#[must_use]
pub fn plan_sort(
    values: &[&str],
    direction: SortDirection,
    datatype: DataType,
) -> Option<(Vec<usize>, SortValue, SortValue)> {
    let mut keyed: Vec<(SortValue, usize)> = Vec::with_capacity(values.len());
    let mut unkeyed: Vec<usize> = Vec::new();
    for (idx, cell) in values.iter().enumerate() {
        match sort_key(cell, datatype) {
            Some(key) => keyed.push((key, idx)),
            None => unkeyed.push(idx),
        }
    }

    let ordered = keyed.windows(2).all(|pair| {
        let ord = compare(&pair[0].0, &pair[1].0);
        match direction {
            SortDirection::Ascending => ord != Ordering::Greater,
            SortDirection::Descending => ord != Ordering::Less,
        }
    });
    if ordered {
        return None;
    }

    match direction {
        SortDirection::Ascending => keyed.sort_by(|a, b| compare(&a.0, &b.0)),
        SortDirection::Descending => keyed.sort_by(|a, b| compare(&b.0, &a.0)),
    }

    let max = keyed.iter().map(|(k, _)| k).max_by(|a, b| compare(a, b))?.clone();
    let min = keyed.iter().map(|(k, _)| k).min_by(|a, b| compare(a, b))?.clone();
    let order = keyed.into_iter().map(|(_, idx)| idx).chain(unkeyed).collect();
    Some((order, max, min))
}

fn parse_completion(text: &str) -> Option<(String, SortDirection, DataType)> {
    let datatype = DataType::from_label(first_capture(&DATATYPE, text)?);
    let direction = SortDirection::from_phrase(first_capture(&ORDER, text)?)?;
    let column = first_capture(&SORT_CALL, text)?.to_string();
    Some((column, direction, datatype))
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    let mut seen = vec![false; len];
    order.len() == len
        && order
            .iter()
            .all(|&idx| idx < len && !std::mem::replace(&mut seen[idx], true))
}

/// Sort-by operation
#[derive(Debug, Clone, Copy, Default)]
pub struct SortBy;

#[async_trait]
impl TableOperation for SortBy {
    type Candidate = SortCandidate;

    fn operation(&self) -> Operation {
        Operation::SortColumn
    }

    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<SortCandidate>>, GeneratorError> {
        let snapshot = ctx.snapshot;
        let prompt = sort_column_prompt(snapshot, &ctx.task.statement);
        let completions = generator.complete(&prompt, ctx.options).await?;

        let mut tally = ConfidenceTally::new();
        for completion in &completions {
            match parse_completion(&completion.text) {
                Some(key) if snapshot.column_index(&key.0).is_some() => {
                    tally.add(key, completion.log_score);
                }
                _ => {}
            }
        }

        let candidates: Vec<Ranked<SortCandidate>> = tally
            .into_ranked()
            .into_iter()
            .filter_map(|ranked| {
                let (column, direction, datatype) = ranked.value;
                let index = snapshot.column_index(&column)?;
                let Some((order, max, min)) =
                    plan_sort(&snapshot.column_values(index), direction, datatype)
                else {
                    debug!("sort_column {} already ordered", column);
                    return None;
                };
                Some(Ranked::new(
                    SortCandidate {
                        column,
                        direction,
                        datatype,
                        order,
                        max,
                        min,
                    },
                    ranked.confidence,
                ))
            })
            .collect();
        debug!(
            "sort_column kept {} candidates from {} completions",
            candidates.len(),
            completions.len()
        );
        Ok(candidates)
    }

    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<SortCandidate>],
        policy: &ApplyPolicy,
    ) -> TableSnapshot {
        let Some(top) = candidates.first() else {
            return snapshot.skipped(Operation::SortColumn);
        };
        let candidate = &top.value;
        if policy.sort_filter == SortFilter::OnlyNumeric && candidate.datatype != DataType::Numeric {
            debug!("sort_column {} is {:?}, filtered", candidate.column, candidate.datatype);
            return snapshot.skipped(Operation::SortColumn);
        }
        if snapshot.column_index(&candidate.column).is_none()
            || !is_permutation(&candidate.order, snapshot.row_count())
        {
            return snapshot.skipped(Operation::SortColumn);
        }
        snapshot.with_sorted_rows(
            &candidate.order,
            SortFacts {
                column: candidate.column.clone(),
                max: candidate.max.clone(),
                min: candidate.min.clone(),
            },
            TraceEntry::kept(Operation::SortColumn, candidate.column.clone()),
        )
    }
}
