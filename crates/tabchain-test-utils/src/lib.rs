//! Testing utilities for the tabchain workspace
//!
//! Shared Generator doubles and table fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tabchain_core::prompts::{
    ADD_COLUMN_DEMO, ADD_COLUMN_VALUE_MARKER, FINAL_QUERY_INSTRUCTION, GROUP_COLUMN_DEMO,
    PLAN_FULL_DEMO, SELECT_COLUMN_DEMO, SELECT_ROW_DEMO, SORT_COLUMN_DEMO,
};
use tabchain_core::{Completion, GenerationOptions, Generator, GeneratorError, RawTable, Task};

/// Which stage built a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Planner,
    AddColumn,
    AddColumnFollowUp,
    SelectRow,
    SelectColumn,
    GroupColumn,
    SortColumn,
    FinalQuery,
    Unknown,
}

impl PromptKind {
    /// Classify a prompt by its exemplar block
    #[must_use]
    pub fn classify(prompt: &str) -> Self {
        if prompt.contains(PLAN_FULL_DEMO) {
            Self::Planner
        } else if prompt.ends_with(ADD_COLUMN_VALUE_MARKER) {
            Self::AddColumnFollowUp
        } else if prompt.starts_with(ADD_COLUMN_DEMO.trim_end()) {
            Self::AddColumn
        } else if prompt.starts_with(SELECT_ROW_DEMO.trim_end()) {
            Self::SelectRow
        } else if prompt.starts_with(SELECT_COLUMN_DEMO.trim_end()) {
            Self::SelectColumn
        } else if prompt.starts_with(GROUP_COLUMN_DEMO.trim_end()) {
            Self::GroupColumn
        } else if prompt.starts_with(SORT_COLUMN_DEMO.trim_end()) {
            Self::SortColumn
        } else if prompt.starts_with(FINAL_QUERY_INSTRUCTION) {
            Self::FinalQuery
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<Vec<Completion>>,
    sticky: Option<Vec<Completion>>,
}

/// Deterministic Generator serving scripted completions per prompt kind
///
/// Queued responses are served first, then the sticky one, then the
/// placeholder.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<PromptKind, Script>>,
    prompts: Mutex<Vec<(PromptKind, String)>>,
    calls: AtomicUsize,
    fail_on: Option<String>,
    panic_on: Option<String>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `completions` once for `kind`
    #[must_use]
    pub fn with_queued(self, kind: PromptKind, completions: Vec<Completion>) -> Self {
        self.scripts.lock().entry(kind).or_default().queued.push_back(completions);
        self
    }

    /// Serve `completions` for `kind` whenever the queue is empty
    #[must_use]
    pub fn with_sticky(self, kind: PromptKind, completions: Vec<Completion>) -> Self {
        self.scripts.lock().entry(kind).or_default().sticky = Some(completions);
        self
    }

    /// Sticky single completion with log score 0
    #[must_use]
    pub fn with_text(self, kind: PromptKind, text: &str) -> Self {
        self.with_sticky(kind, vec![Completion::new(text, 0.0)])
    }

    /// Return `Unavailable` for any prompt containing `marker`
    #[must_use]
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    /// Panic for any prompt containing `marker`
    #[must_use]
    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_on = Some(marker.to_string());
        self
    }

    /// Total calls served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls served for one kind
    pub fn calls_for(&self, kind: PromptKind) -> usize {
        self.prompts.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<(PromptKind, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<Completion>, GeneratorError> {
        let kind = PromptKind::classify(prompt);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push((kind, prompt.to_string()));

        if let Some(marker) = &self.panic_on {
            assert!(!prompt.contains(marker.as_str()), "scripted panic on {marker}");
        }
        if self.fail_on.as_ref().is_some_and(|m| prompt.contains(m.as_str())) {
            return Err(GeneratorError::Unavailable("scripted failure".into()));
        }

        let mut scripts = self.scripts.lock();
        let served = scripts.get_mut(&kind).and_then(|script| {
            script
                .queued
                .pop_front()
                .or_else(|| script.sticky.clone())
        });
        let completions = served.unwrap_or_else(|| vec![Completion::placeholder()]);
        let wanted = usize::try_from(options.sample_count).unwrap_or(usize::MAX);
        Ok(completions.into_iter().take(wanted.max(1)).collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Planner completion naming a chain
pub fn plan_text(chain: &str) -> String {
    format!(" {chain}")
}

/// Sort-by completion for a column
pub fn sort_text(column: &str, order: &str, datatype: &str) -> String {
    format!(
        "the statement is about the order of {column}. The datatype is {datatype}.\n\
         Therefore, the answer is: f_sort({column}), the order is \"{order}\"."
    )
}

/// Group-by completion for a column
pub fn group_text(column: &str) -> String {
    format!("We can group column \"{column}\".\nTherefore, the answer is: f_group({column}).")
}

/// Row-selection completion
pub fn row_text(rows: &str) -> String {
    format!("we need these rows.\nThe answer is : f_row([{rows}])")
}

/// Column-selection completion
pub fn column_text(columns: &str) -> String {
    format!("semantic sentence link to columns :\nNone\nThe answer is : f_col([{columns}])")
}

/// Build a raw table from string slices
pub fn raw_table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
    RawTable::new(
        headers.iter().map(ToString::to_string).collect(),
        rows.iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect(),
    )
}

/// Three-row year/score table
pub fn scores_table() -> RawTable {
    raw_table(
        &["year", "score"],
        &[&["1999", "10"], &["2000", "20"], &["2001", "5"]],
    )
}

/// "2001 has the lowest score" over [`scores_table`]
pub fn scores_task(id: &str) -> Task {
    Task::new(id, scores_table(), "2001 has the lowest score").with_label(1)
}

/// Generator that sorts the scores ascending and answers `YES`
pub fn sort_scores_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .with_text(PromptKind::Planner, &plan_text("f_sort_column(score) -> <END>"))
        .with_text(
            PromptKind::SortColumn,
            &sort_text("score", "small to large", "Numerical"),
        )
        .with_text(PromptKind::FinalQuery, "YES")
}
