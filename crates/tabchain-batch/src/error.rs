//! Error types for batch execution
//!
//! Task-level errors never abort a batch; the executor logs them and records
//! the task as absent.

use std::path::PathBuf;
use tabchain_core::{ChainError, TaskId};

/// Checkpoint store errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Filesystem failure
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be encoded or decoded
    #[error("checkpoint encoding: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The file at an identity's path holds another task
    #[error("checkpoint holds task {found}, expected {expected}")]
    IdentityMismatch {
        /// Requested identity
        expected: TaskId,
        /// Identity stored in the file
        found: TaskId,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of one task inside a batch
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Chain or final query failed
    #[error("chain failed: {0}")]
    Chain(#[from] ChainError),

    /// Checkpoint could not be read or written
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Task panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Dataset loading errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// File could not be read
    #[error("dataset I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid record
    #[error("dataset line {line}: {source}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A record has no header row
    #[error("dataset line {line}: table_text has no header row")]
    EmptyTable {
        /// 1-based line number
        line: usize,
    },
}
