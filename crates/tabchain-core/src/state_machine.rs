//! Chain state machine
//!
//! Operations run in at most the fixed relative order
//! `add_column < select_row < select_column < group_column < sort_column < END`.
//! Once an operation is kept, only operations after it remain legal. Once an
//! operation is skipped, it is never offered again.

use crate::table::TraceEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of table operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Derive a new column from existing cell text
    AddColumn,
    /// Keep a subset of rows
    SelectRow,
    /// Keep a subset of columns
    SelectColumn,
    /// Attach value counts of one column
    GroupColumn,
    /// Reorder rows by one column
    SortColumn,
}

impl Operation {
    /// All operations in chain order
    pub const ALL: [Operation; 5] = [
        Operation::AddColumn,
        Operation::SelectRow,
        Operation::SelectColumn,
        Operation::GroupColumn,
        Operation::SortColumn,
    ];

    /// Snake-case name as it appears in `f_<name>(...)`
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Operation::AddColumn => "add_column",
            Operation::SelectRow => "select_row",
            Operation::SelectColumn => "select_column",
            Operation::GroupColumn => "group_column",
            Operation::SortColumn => "sort_column",
        }
    }

    /// Parse a snake-case operation name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name.trim())
    }

    /// Call form with empty arguments, e.g. `f_sort_column()`
    #[inline]
    #[must_use]
    pub fn empty_call(self) -> String {
        format!("f_{}()", self.name())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a chain currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainState {
    /// Nothing kept yet
    Init,
    /// Last kept operation
    After(Operation),
    /// Terminal
    End,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Init => f.write_str("<init>"),
            ChainState::After(op) => f.write_str(op.name()),
            ChainState::End => f.write_str("<END>"),
        }
    }
}

/// A planner decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NextStep {
    /// Run this operation next
    Apply(Operation),
    /// Stop and go to the final query
    End,
}

impl fmt::Display for NextStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextStep::Apply(op) => f.write_str(&op.empty_call()),
            NextStep::End => f.write_str("<END>"),
        }
    }
}

/// Transitions allowed out of a state, before skip filtering
#[must_use]
pub fn allowed_transitions(from: ChainState) -> Vec<NextStep> {
    match from {
        ChainState::Init => Operation::ALL.into_iter().map(NextStep::Apply).collect(),
        ChainState::After(last) => Operation::ALL
            .into_iter()
            .filter(|op| *op > last)
            .map(NextStep::Apply)
            .chain(std::iter::once(NextStep::End))
            .collect(),
        ChainState::End => Vec::new(),
    }
}

/// Check a single transition against the fixed order
#[inline]
#[must_use]
pub fn is_allowed(from: ChainState, to: NextStep) -> bool {
    allowed_transitions(from).contains(&to)
}

/// State implied by a trace: the last kept operation, or `Init`
#[must_use]
pub fn current_state(trace: &[TraceEntry]) -> ChainState {
    trace
        .iter()
        .rev()
        .find(|entry| !entry.skipped)
        .map_or(ChainState::Init, |entry| ChainState::After(entry.operation))
}

/// Legal next steps given the trace so far
///
/// The suffix after the last kept operation, minus every operation that was
/// explicitly skipped anywhere in the trace.
#[must_use]
pub fn legal_next(trace: &[TraceEntry]) -> Vec<NextStep> {
    let skipped: Vec<Operation> = trace
        .iter()
        .filter(|entry| entry.skipped)
        .map(|entry| entry.operation)
        .collect();

    allowed_transitions(current_state(trace))
        .into_iter()
        .filter(|step| match step {
            NextStep::Apply(op) => !skipped.contains(op),
            NextStep::End => true,
        })
        .collect()
}
