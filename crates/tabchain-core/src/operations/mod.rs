//! Table operations
//!
//! Five operations share one two-phase contract:
//! - **propose**: query the Generator, parse each completion with the
//!   operation's pattern, drop the malformed ones and rank the rest by
//!   summed confidence
//! - **apply**: deterministically commit the chosen candidate to a new
//!   snapshot, or append a skip marker
//!
//! The closed set is [`Proposal`]; dispatch is an exhaustive match on
//! [`Operation`], never a name lookup.

pub mod add_column;
pub mod group_by;
pub mod select_column;
pub mod select_row;
pub mod sort_by;

pub use add_column::{AddColumn, AddColumnCandidate};
pub use group_by::{GroupBy, GroupCandidate};
pub use select_column::{ColumnSelection, SelectColumn};
pub use select_row::{RowSelection, SelectRow};
pub use sort_by::{DataType, SortBy, SortCandidate, SortDirection};

use crate::config::ApplyPolicy;
use crate::confidence::Ranked;
use crate::error::GeneratorError;
use crate::generator::{GenerationOptions, Generator};
use crate::state_machine::Operation;
use crate::table::TableSnapshot;
use crate::types::Task;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Inputs of one propose stage
#[derive(Debug, Clone, Copy)]
pub struct ProposeContext<'a> {
    /// Task under verification
    pub task: &'a Task,
    /// Latest snapshot
    pub snapshot: &'a TableSnapshot,
    /// Sampling options for this operation
    pub options: &'a GenerationOptions,
}

impl<'a> ProposeContext<'a> {
    /// Create propose context
    #[inline]
    #[must_use]
    pub fn new(task: &'a Task, snapshot: &'a TableSnapshot, options: &'a GenerationOptions) -> Self {
        Self {
            task,
            snapshot,
            options,
        }
    }

    /// Caption passed to prompts
    #[inline]
    #[must_use]
    pub fn caption(&self) -> Option<&'a str> {
        self.task.caption.as_deref()
    }
}

/// Uniform propose/apply capability of one operation
#[async_trait]
pub trait TableOperation: Send + Sync {
    /// Typed parameter set produced by propose
    type Candidate: Clone + Send + Sync;

    /// Which operation this is
    fn operation(&self) -> Operation;

    /// Ranked candidates, most confident first; empty when nothing parsed
    ///
    /// # Errors
    /// Only Generator failures; malformed completions are dropped.
    async fn propose(
        &self,
        generator: &dyn Generator,
        ctx: &ProposeContext<'_>,
    ) -> Result<Vec<Ranked<Self::Candidate>>, GeneratorError>;

    /// Commit the preferred candidate or append a skip marker
    fn apply(
        &self,
        snapshot: &TableSnapshot,
        candidates: &[Ranked<Self::Candidate>],
        policy: &ApplyPolicy,
    ) -> TableSnapshot;
}

/// Ranked candidates of one step, tagged by operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "candidates", rename_all = "snake_case")]
pub enum Proposal {
    /// Add-column candidates
    AddColumn(Vec<Ranked<AddColumnCandidate>>),
    /// Row-selection candidates
    SelectRow(Vec<Ranked<RowSelection>>),
    /// Column-selection candidates
    SelectColumn(Vec<Ranked<ColumnSelection>>),
    /// Group-by candidates
    GroupColumn(Vec<Ranked<GroupCandidate>>),
    /// Sort-by candidates
    SortColumn(Vec<Ranked<SortCandidate>>),
}

impl Proposal {
    /// Operation that produced this proposal
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Proposal::AddColumn(_) => Operation::AddColumn,
            Proposal::SelectRow(_) => Operation::SelectRow,
            Proposal::SelectColumn(_) => Operation::SelectColumn,
            Proposal::GroupColumn(_) => Operation::GroupColumn,
            Proposal::SortColumn(_) => Operation::SortColumn,
        }
    }

    /// Number of ranked candidates
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        match self {
            Proposal::AddColumn(c) => c.len(),
            Proposal::SelectRow(c) => c.len(),
            Proposal::SelectColumn(c) => c.len(),
            Proposal::GroupColumn(c) => c.len(),
            Proposal::SortColumn(c) => c.len(),
        }
    }

    /// Deterministic apply stage; never calls the Generator
    #[must_use]
    pub fn apply(&self, snapshot: &TableSnapshot, policy: &ApplyPolicy) -> TableSnapshot {
        match self {
            Proposal::AddColumn(c) => AddColumn.apply(snapshot, c, policy),
            Proposal::SelectRow(c) => SelectRow.apply(snapshot, c, policy),
            Proposal::SelectColumn(c) => SelectColumn.apply(snapshot, c, policy),
            Proposal::GroupColumn(c) => GroupBy.apply(snapshot, c, policy),
            Proposal::SortColumn(c) => SortBy.apply(snapshot, c, policy),
        }
    }
}

/// Run the propose stage of `operation`
///
/// # Errors
/// Propagates Generator failures.
pub async fn propose(
    operation: Operation,
    generator: &dyn Generator,
    ctx: &ProposeContext<'_>,
) -> Result<Proposal, GeneratorError> {
    Ok(match operation {
        Operation::AddColumn => Proposal::AddColumn(AddColumn.propose(generator, ctx).await?),
        Operation::SelectRow => Proposal::SelectRow(SelectRow.propose(generator, ctx).await?),
        Operation::SelectColumn => Proposal::SelectColumn(SelectColumn.propose(generator, ctx).await?),
        Operation::GroupColumn => Proposal::GroupColumn(GroupBy.propose(generator, ctx).await?),
        Operation::SortColumn => Proposal::SortColumn(SortBy.propose(generator, ctx).await?),
    })
}

/// Append-only record of every proposal of one task
///
/// Replaying it over the initial snapshot reproduces the final snapshot
/// without the Generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    entries: Vec<Proposal>,
}

impl ChainRecord {
    /// Create empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one proposal
    #[inline]
    pub fn push(&mut self, proposal: Proposal) {
        self.entries.push(proposal);
    }

    /// Proposals in execution order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Proposal] {
        &self.entries
    }

    /// Number of recorded steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No step recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-apply every proposal in order starting from `initial`
    #[must_use]
    pub fn replay(&self, initial: &TableSnapshot, policy: &ApplyPolicy) -> TableSnapshot {
        self.entries
            .iter()
            .fold(initial.clone(), |snapshot, proposal| proposal.apply(&snapshot, policy))
    }
}

/// First capture group of `pattern` in `text`, trimmed
pub(crate) fn first_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Top-k candidate values
pub(crate) fn top_k<T>(candidates: &[Ranked<T>], k: usize) -> impl Iterator<Item = &T> {
    candidates.iter().take(k.max(1)).map(|ranked| &ranked.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TableSnapshot {
        TableSnapshot::new(
            vec!["year".into(), "score".into()],
            vec![
                vec!["1999".into(), "10".into()],
                vec!["2000".into(), "20".into()],
                vec!["2001".into(), "5".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn empty_proposal_applies_as_skip() {
        let base = snapshot();
        let policy = ApplyPolicy::default();
        for proposal in [
            Proposal::AddColumn(Vec::new()),
            Proposal::SelectRow(Vec::new()),
            Proposal::SelectColumn(Vec::new()),
            Proposal::GroupColumn(Vec::new()),
            Proposal::SortColumn(Vec::new()),
        ] {
            let next = proposal.apply(&base, &policy);
            assert_eq!(next.rows(), base.rows());
            assert_eq!(next.headers(), base.headers());
            let entry = next.trace().last().unwrap();
            assert!(entry.skipped);
            assert_eq!(entry.operation, proposal.operation());
        }
    }

    #[test]
    fn replay_of_empty_record_is_identity() {
        let base = snapshot();
        assert_eq!(ChainRecord::new().replay(&base, &ApplyPolicy::default()), base);
    }

    #[test]
    fn proposal_serializes_with_operation_tag() {
        let json = serde_json::to_value(Proposal::GroupColumn(Vec::new())).unwrap();
        assert_eq!(json["operation"], "group_column");
    }
}
