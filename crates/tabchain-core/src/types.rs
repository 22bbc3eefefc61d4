//! Task types
//!
//! A [`Task`] is one fact-verification unit: a raw table, the statement to
//! verify, an optional caption and an optional ground-truth label used only
//! for evaluation.

use crate::error::TableError;
use crate::table::TableSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task identity, unique within a batch
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create task id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Raw table exactly as read from the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    /// Header row
    pub headers: Vec<String>,
    /// Data rows
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Create raw table
    #[inline]
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }
}

/// One fact-verification unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identity
    pub id: TaskId,
    /// Raw table
    pub table: RawTable,
    /// Optional table caption
    pub caption: Option<String>,
    /// Statement to verify
    pub statement: String,
    /// Statement with entity noise removed, used by add-column
    #[serde(default)]
    pub cleaned_statement: Option<String>,
    /// Ground truth (1 = entailed, 0 = refuted), evaluation only
    #[serde(default)]
    pub label: Option<u8>,
}

impl Task {
    /// Create task
    #[must_use]
    pub fn new(id: impl Into<TaskId>, table: RawTable, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table,
            caption: None,
            statement: statement.into(),
            cleaned_statement: None,
            label: None,
        }
    }

    /// With caption
    #[inline]
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// With cleaned statement
    #[inline]
    #[must_use]
    pub fn with_cleaned_statement(mut self, cleaned: impl Into<String>) -> Self {
        self.cleaned_statement = Some(cleaned.into());
        self
    }

    /// With ground-truth label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: u8) -> Self {
        self.label = Some(label);
        self
    }

    /// Statement the add-column prompt should see
    #[inline]
    #[must_use]
    pub fn add_column_statement(&self) -> &str {
        self.cleaned_statement.as_deref().unwrap_or(&self.statement)
    }

    /// Initial snapshot with an empty trace
    ///
    /// # Errors
    /// Returns `TableError` if the raw table is malformed.
    pub fn initial_snapshot(&self) -> Result<TableSnapshot, TableError> {
        TableSnapshot::new(self.table.headers.clone(), self.table.rows.clone())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RawTable {
        RawTable::new(
            vec!["year".into(), "score".into()],
            vec![vec!["1999".into(), "10".into()]],
        )
    }

    #[test]
    fn task_builder() {
        let task = Task::new("test-0", table(), "1999 scored 10")
            .with_caption("scores")
            .with_label(1);
        assert_eq!(task.id.as_str(), "test-0");
        assert_eq!(task.caption.as_deref(), Some("scores"));
        assert_eq!(task.label, Some(1));
    }

    #[test]
    fn add_column_statement_prefers_cleaned() {
        let task = Task::new("t", table(), "raw");
        assert_eq!(task.add_column_statement(), "raw");
        let task = task.with_cleaned_statement("clean");
        assert_eq!(task.add_column_statement(), "clean");
    }

    #[test]
    fn initial_snapshot_has_empty_trace() {
        let snapshot = Task::new("t", table(), "s").initial_snapshot().unwrap();
        assert!(snapshot.trace().is_empty());
        assert_eq!(snapshot.row_count(), 1);
    }

    #[test]
    fn task_id_serializes_transparently() {
        let json = serde_json::to_string(&TaskId::new("abc-1")).unwrap();
        assert_eq!(json, "\"abc-1\"");
    }
}
