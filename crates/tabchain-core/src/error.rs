//! Error types for tabchain core
//!
//! Only two things can fail a chain:
//! - the Generator collaborator (unavailable, timed out, unusable response)
//! - a raw record that cannot become a well-formed table
//!
//! Malformed completions and rejected candidates are not errors. They are
//! dropped at parse time or recorded as skip steps.

/// Errors surfaced by a [`Generator`](crate::generator::Generator)
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeneratorError {
    /// Backend unreachable or refused the request
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time
    #[error("generator timed out after {duration_secs}s")]
    Timeout {
        /// Elapsed time before giving up
        duration_secs: u64,
    },

    /// Backend answered with something that is not a completion list
    #[error("invalid generator response: {0}")]
    InvalidResponse(String),
}

impl GeneratorError {
    /// Check if a backend may reasonably retry after this error
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Raw record could not be turned into a table snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// A row does not have one cell per header
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// 0-based data row index
        row: usize,
        /// Header count
        expected: usize,
        /// Cell count of the offending row
        found: usize,
    },

    /// Two headers share a name
    #[error("duplicate header: {0}")]
    DuplicateHeader(String),

    /// Table without columns
    #[error("table has no header row")]
    EmptyHeader,
}

/// Errors that abort a single chain run
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Generator call failed
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Raw table is malformed
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

impl ChainError {
    /// Check if the failure came from the Generator collaborator
    #[inline]
    #[must_use]
    pub fn is_generator_failure(&self) -> bool {
        matches!(self, Self::Generator(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_error_display() {
        let err = GeneratorError::Timeout { duration_secs: 30 };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn generator_error_is_retryable() {
        assert!(GeneratorError::Unavailable("quota".into()).is_retryable());
        assert!(GeneratorError::Timeout { duration_secs: 1 }.is_retryable());
        assert!(!GeneratorError::InvalidResponse("bad".into()).is_retryable());
    }

    #[test]
    fn chain_error_from_table_error() {
        let err: ChainError = TableError::DuplicateHeader("year".into()).into();
        assert!(!err.is_generator_failure());
        assert!(err.to_string().contains("duplicate header: year"));
    }
}
