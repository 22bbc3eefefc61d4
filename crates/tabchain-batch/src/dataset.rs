//! TabFact-style JSONL reader
//!
//! One record per line: `statement`, `table_caption`, `table_text` (header
//! row followed by data rows), `label` and an optional `cleaned_statement`.
//! Identities are `"{tag}-{index}"` over non-blank lines.
//!
//! Cleaned statements may also come from a separate `raw2clean.jsonl` of
//! `{"statement", "cleaned_statement"}` lines, merged by statement text
//! through [`CleanedStatements`].

use crate::error::DatasetError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tabchain_core::{RawTable, Task};
use tracing::info;

#[derive(Debug, Deserialize)]
struct Record {
    statement: String,
    #[serde(default)]
    table_caption: Option<String>,
    table_text: Vec<Vec<String>>,
    #[serde(default)]
    label: Option<u8>,
    #[serde(default)]
    cleaned_statement: Option<String>,
}

/// Parse JSONL text into tasks
///
/// # Errors
/// `DatasetError::Parse` or `DatasetError::EmptyTable` naming the first bad
/// line.
pub fn parse_jsonl(text: &str, tag: &str, first_n: Option<usize>) -> Result<Vec<Task>, DatasetError> {
    let limit = first_n.unwrap_or(usize::MAX);
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(limit)
        .enumerate()
        .map(|(index, (line_no, line))| {
            let record: Record = serde_json::from_str(line).map_err(|source| DatasetError::Parse {
                line: line_no + 1,
                source,
            })?;
            to_task(record, format!("{tag}-{index}"), line_no + 1)
        })
        .collect()
}

/// Read a JSONL dataset file
///
/// # Errors
/// `DatasetError::Io` if the file cannot be read, otherwise as
/// [`parse_jsonl`].
pub fn read_jsonl(path: &Path, tag: &str, first_n: Option<usize>) -> Result<Vec<Task>, DatasetError> {
    let text = std::fs::read_to_string(path)?;
    let tasks = parse_jsonl(&text, tag, first_n)?;
    info!("loaded {} tasks from {}", tasks.len(), path.display());
    Ok(tasks)
}

#[derive(Debug, Deserialize)]
struct CleanRecord {
    statement: String,
    cleaned_statement: String,
}

/// Raw statement to cleaned statement lookup
#[derive(Debug, Clone, Default)]
pub struct CleanedStatements {
    by_statement: HashMap<String, String>,
}

impl CleanedStatements {
    /// Parse `raw2clean` JSONL text; later lines win on repeated statements
    ///
    /// # Errors
    /// `DatasetError::Parse` naming the first bad line.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let mut by_statement = HashMap::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CleanRecord = serde_json::from_str(line).map_err(|source| DatasetError::Parse {
                line: line_no + 1,
                source,
            })?;
            by_statement.insert(record.statement, record.cleaned_statement);
        }
        Ok(Self { by_statement })
    }

    /// Read a `raw2clean` JSONL file
    ///
    /// # Errors
    /// `DatasetError::Io` if the file cannot be read, otherwise as
    /// [`CleanedStatements::parse`].
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path)?;
        let cleaned = Self::parse(&text)?;
        info!("loaded {} cleaned statements from {}", cleaned.len(), path.display());
        Ok(cleaned)
    }

    /// Cleaned form of `statement`, if known
    #[must_use]
    pub fn get(&self, statement: &str) -> Option<&str> {
        self.by_statement.get(statement).map(String::as_str)
    }

    /// Number of known statements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_statement.len()
    }

    /// Whether no statement is known
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_statement.is_empty()
    }

    /// Set the cleaned statement of every task whose statement is known
    ///
    /// Overrides an inline `cleaned_statement`. Returns the number of tasks
    /// updated.
    pub fn merge_into(&self, tasks: &mut [Task]) -> usize {
        let mut merged = 0;
        for task in tasks {
            if let Some(cleaned) = self.get(&task.statement) {
                task.cleaned_statement = Some(cleaned.to_string());
                merged += 1;
            }
        }
        merged
    }
}

fn to_task(record: Record, id: String, line: usize) -> Result<Task, DatasetError> {
    let mut rows = record.table_text.into_iter();
    let headers = rows.next().ok_or(DatasetError::EmptyTable { line })?;

    let mut task = Task::new(id, RawTable::new(headers, rows.collect()), record.statement);
    if let Some(caption) = record.table_caption {
        task = task.with_caption(caption);
    }
    if let Some(cleaned) = record.cleaned_statement {
        task = task.with_cleaned_statement(cleaned);
    }
    if let Some(label) = record.label {
        task = task.with_label(label);
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{"statement": "2001 has the lowest score", "table_caption": "scores", "table_text": [["year", "score"], ["1999", "10"], ["2001", "5"]], "label": 1}

{"statement": "there are 3 rows", "table_text": [["a"], ["1"]], "label": 0, "cleaned_statement": "there are 3 rows"}
"#;

    #[test]
    fn records_become_tasks() {
        let tasks = parse_jsonl(SAMPLE, "test", None).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_str(), "test-0");
        assert_eq!(tasks[1].id.as_str(), "test-1");
        assert_eq!(tasks[0].caption.as_deref(), Some("scores"));
        assert_eq!(tasks[0].table.headers, vec!["year".to_string(), "score".to_string()]);
        assert_eq!(tasks[0].table.rows.len(), 2);
        assert_eq!(tasks[0].label, Some(1));
        assert_eq!(tasks[1].caption, None);
        assert_eq!(tasks[1].cleaned_statement.as_deref(), Some("there are 3 rows"));
    }

    #[test]
    fn first_n_limits_records() {
        let tasks = parse_jsonl(SAMPLE, "test", Some(1)).unwrap();
        assert_eq!(tasks.len(), 1);
    }

    const RAW2CLEAN: &str = r#"{"statement": "2001 has the lowest score", "cleaned_statement": "2001 has the lowest score of all years"}
{"statement": "unrelated", "cleaned_statement": "unrelated too"}
"#;

    #[test]
    fn raw2clean_file_fills_cleaned_statements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw2clean.jsonl");
        std::fs::write(&path, RAW2CLEAN).unwrap();

        let cleaned = CleanedStatements::read(&path).unwrap();
        let mut tasks = parse_jsonl(SAMPLE, "test", None).unwrap();
        let merged = cleaned.merge_into(&mut tasks);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(merged, 1);
        assert_eq!(
            tasks[0].cleaned_statement.as_deref(),
            Some("2001 has the lowest score of all years")
        );
        // unknown statements keep whatever the record carried
        assert_eq!(tasks[1].cleaned_statement.as_deref(), Some("there are 3 rows"));
    }

    #[test]
    fn bad_raw2clean_line_is_reported() {
        let err = CleanedStatements::parse("\n{\"statement\": \"s\"}\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }

    #[test]
    fn bad_line_is_reported() {
        let err = parse_jsonl("{\"statement\": 1}\n", "test", None).unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 1, .. }));

        let err = parse_jsonl(r#"{"statement": "s", "table_text": []}"#, "test", None).unwrap_err();
        assert!(matches!(err, DatasetError::EmptyTable { line: 1 }));
    }
}
