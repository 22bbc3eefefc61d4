//! Table snapshots
//!
//! A [`TableSnapshot`] is the table state between two operations:
//! headers, rows, an append-only action trace and the auxiliary facts
//! produced by group-by and sort-by. Snapshots are never mutated in place;
//! every apply stage derives a new one from its predecessor.

use crate::error::TableError;
use crate::state_machine::Operation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One entry of the action trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Operation this step ran
    pub operation: Operation,
    /// Whether the step degraded to a no-op
    pub skipped: bool,
    /// Rendered call arguments (empty for skips)
    pub args: String,
    /// Audit arguments when they differ from the display ones
    pub audit_args: Option<String>,
}

impl TraceEntry {
    /// Kept step with rendered arguments
    #[inline]
    #[must_use]
    pub fn kept(operation: Operation, args: impl Into<String>) -> Self {
        Self {
            operation,
            skipped: false,
            args: args.into(),
            audit_args: None,
        }
    }

    /// Explicit skip marker
    #[inline]
    #[must_use]
    pub fn skip(operation: Operation) -> Self {
        Self {
            operation,
            skipped: true,
            args: String::new(),
            audit_args: None,
        }
    }

    /// Attach audit arguments
    #[inline]
    #[must_use]
    pub fn with_audit(mut self, audit_args: impl Into<String>) -> Self {
        self.audit_args = Some(audit_args.into());
        self
    }

    /// Audit rendering (falls back to the display rendering)
    #[must_use]
    pub fn audit(&self) -> String {
        match (&self.audit_args, self.skipped) {
            (Some(args), false) => format!("f_{}({args})", self.operation.name()),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            write!(f, "skip {}", self.operation.empty_call())
        } else {
            write!(f, "f_{}({})", self.operation.name(), self.args)
        }
    }
}

/// Value counts attached by group-by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFacts {
    /// Grouped column
    pub column: String,
    /// `(value, count)` sorted by descending count
    pub groups: Vec<(String, usize)>,
}

/// A sort key value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    /// Normalized numeric value
    Number(f64),
    /// Trimmed text value
    Text(String),
}

impl fmt::Display for SortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortValue::Number(n) => write!(f, "{n}"),
            SortValue::Text(s) => f.write_str(s),
        }
    }
}

/// Extremes of the sort key recorded by sort-by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortFacts {
    /// Sorted column
    pub column: String,
    /// Largest key
    pub max: SortValue,
    /// Smallest key
    pub min: SortValue,
}

/// Current table state plus its trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    trace: Vec<TraceEntry>,
    group_facts: Option<GroupFacts>,
    sort_facts: Option<SortFacts>,
}

impl TableSnapshot {
    /// Build the initial snapshot from a raw record
    ///
    /// # Errors
    /// - `TableError::EmptyHeader` if there are no columns
    /// - `TableError::DuplicateHeader` if two columns share a name
    /// - `TableError::RaggedRow` if a row length differs from the header
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        let snapshot = Self {
            headers,
            rows,
            trace: Vec::new(),
            group_facts: None,
            sort_facts: None,
        };
        snapshot.check_invariants()?;
        Ok(snapshot)
    }

    /// Verify header uniqueness and row widths
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), TableError> {
        if self.headers.is_empty() {
            return Err(TableError::EmptyHeader);
        }
        let mut seen = HashSet::with_capacity(self.headers.len());
        for header in &self.headers {
            if !seen.insert(header.as_str()) {
                return Err(TableError::DuplicateHeader(header.clone()));
            }
        }
        for (row, cells) in self.rows.iter().enumerate() {
            if cells.len() != self.headers.len() {
                return Err(TableError::RaggedRow {
                    row,
                    expected: self.headers.len(),
                    found: cells.len(),
                });
            }
        }
        Ok(())
    }

    /// Column names
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Action trace
    #[inline]
    #[must_use]
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Group-by side table, if any
    #[inline]
    #[must_use]
    pub fn group_facts(&self) -> Option<&GroupFacts> {
        self.group_facts.as_ref()
    }

    /// Sort-by extremes, if any
    #[inline]
    #[must_use]
    pub fn sort_facts(&self) -> Option<&SortFacts> {
        self.sort_facts.as_ref()
    }

    /// Number of data rows
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column (exact match)
    #[inline]
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column in row order
    #[must_use]
    pub fn column_values(&self, index: usize) -> Vec<&str> {
        self.rows.iter().map(|row| row[index].as_str()).collect()
    }

    /// Kept steps rendered for the planner
    #[must_use]
    pub fn kept_chain(&self) -> Vec<String> {
        self.trace
            .iter()
            .filter(|entry| !entry.skipped)
            .map(ToString::to_string)
            .collect()
    }

    /// Every step in audit rendering
    #[must_use]
    pub fn audit_trace(&self) -> Vec<String> {
        self.trace.iter().map(TraceEntry::audit).collect()
    }

    /// Linearize as `col : ... / row i : ...` text
    #[must_use]
    pub fn linearize(&self, caption: Option<&str>, max_rows: usize) -> String {
        linearize_rows(&self.headers, &self.rows, caption, max_rows)
    }

    /// Same table with a skip marker appended
    #[must_use]
    pub fn skipped(&self, operation: Operation) -> Self {
        self.derive(TraceEntry::skip(operation))
    }

    /// Same table with a kept entry that changed nothing
    pub(crate) fn unchanged(&self, entry: TraceEntry) -> Self {
        self.derive(entry)
    }

    /// Append a column; caller guarantees a fresh name and one value per row
    pub(crate) fn with_column(&self, name: &str, values: Vec<String>, entry: TraceEntry) -> Self {
        let mut next = self.derive(entry);
        next.headers.push(name.to_string());
        for (row, value) in next.rows.iter_mut().zip(values) {
            row.push(value);
        }
        next
    }

    /// Keep the given rows (0-based indices, in the given order)
    pub(crate) fn with_rows(&self, indices: &[usize], entry: TraceEntry) -> Self {
        let mut next = self.derive(entry);
        next.rows = indices.iter().map(|&i| self.rows[i].clone()).collect();
        next
    }

    /// Keep the given columns (0-based indices, in the given order)
    pub(crate) fn with_columns(&self, indices: &[usize], entry: TraceEntry) -> Self {
        let mut next = self.derive(entry);
        next.headers = indices.iter().map(|&i| self.headers[i].clone()).collect();
        next.rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        next
    }

    /// Attach group counts
    pub(crate) fn with_group_facts(&self, facts: GroupFacts, entry: TraceEntry) -> Self {
        let mut next = self.derive(entry);
        next.group_facts = Some(facts);
        next
    }

    /// Reorder rows and record sort extremes
    pub(crate) fn with_sorted_rows(&self, order: &[usize], facts: SortFacts, entry: TraceEntry) -> Self {
        let mut next = self.with_rows(order, entry);
        next.sort_facts = Some(facts);
        next
    }

    fn derive(&self, entry: TraceEntry) -> Self {
        let mut next = self.clone();
        next.trace.push(entry);
        next
    }
}

/// Linearize any header/row slice; rows are numbered from 1
#[must_use]
pub fn linearize_rows(
    headers: &[String],
    rows: &[Vec<String>],
    caption: Option<&str>,
    max_rows: usize,
) -> String {
    let mut out = String::new();
    if let Some(caption) = caption {
        out.push_str("table caption : ");
        out.push_str(caption);
        out.push('\n');
    }
    out.push_str("col : ");
    out.push_str(&headers.join(" | "));
    for (idx, row) in rows.iter().take(max_rows).enumerate() {
        out.push_str(&format!("\nrow {} : {}", idx + 1, row.join(" | ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableSnapshot {
        TableSnapshot::new(
            vec!["year".into(), "score".into()],
            vec![
                vec!["1999".into(), "10".into()],
                vec!["2000".into(), "20".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = TableSnapshot::new(vec!["a".into(), "b".into()], vec![vec!["1".into()]]);
        assert_eq!(
            err,
            Err(TableError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn rejects_duplicate_headers() {
        let err = TableSnapshot::new(vec!["a".into(), "a".into()], vec![]);
        assert_eq!(err, Err(TableError::DuplicateHeader("a".into())));
    }

    #[test]
    fn linearize_with_caption_and_row_budget() {
        let text = sample().linearize(Some("scores"), 1);
        assert_eq!(text, "table caption : scores\ncol : year | score\nrow 1 : 1999 | 10");
    }

    #[test]
    fn derived_snapshot_leaves_predecessor_untouched() {
        let base = sample();
        let next = base.with_column("decade", vec!["1990s".into(), "2000s".into()], TraceEntry::kept(Operation::AddColumn, "decade"));
        assert_eq!(base.headers().len(), 2);
        assert!(base.trace().is_empty());
        assert_eq!(next.headers().len(), 3);
        assert!(next.check_invariants().is_ok());
    }

    #[test]
    fn trace_rendering() {
        let kept = TraceEntry::kept(Operation::SelectRow, "row 1, row 2").with_audit("row 0, row 3");
        assert_eq!(kept.to_string(), "f_select_row(row 1, row 2)");
        assert_eq!(kept.audit(), "f_select_row(row 0, row 3)");
        assert_eq!(TraceEntry::skip(Operation::SortColumn).to_string(), "skip f_sort_column()");
    }

    #[test]
    fn sort_value_display() {
        assert_eq!(SortValue::Number(5.0).to_string(), "5");
        assert_eq!(SortValue::Number(-12.5).to_string(), "-12.5");
        assert_eq!(SortValue::Text("may".into()).to_string(), "may");
    }
}
