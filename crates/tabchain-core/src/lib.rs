//! tabchain core - table fact verification through operation chains
//!
//! A statement about a table is verified by:
//! - planning the next table operation from the legal set
//! - proposing candidate parameters from repeated Generator samples
//! - applying the top candidate deterministically (or skipping)
//! - asking a final yes/no question over the transformed table
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabchain_core::{ChainConfig, ChainDriver, RawTable, Task};
//!
//! # async fn example(generator: Arc<dyn tabchain_core::Generator>) -> Result<(), Box<dyn std::error::Error>> {
//! let driver = ChainDriver::new(generator, ChainConfig::default());
//! let table = RawTable::new(
//!     vec!["year".into(), "score".into()],
//!     vec![vec!["1999".into(), "10".into()], vec!["2001".into(), "5".into()]],
//! );
//! let task = Task::new("demo-0", table, "2001 has the lowest score");
//! let (result, _log) = driver.verify(&task).await?;
//!
//! println!("verdict: {}", result.answer.verdict);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod confidence;
pub mod config;
pub mod driver;
pub mod error;
pub mod final_query;
pub mod generator;
pub mod operations;
pub mod planner;
pub mod prompts;
pub mod state_machine;
pub mod table;
pub mod types;

// Re-exports for convenience
pub use confidence::{ConfidenceTally, Ranked};
pub use config::{ApplyPolicy, ChainConfig, PlanStrategy, SortFilter, VerdictStrategy};
pub use driver::{ChainDriver, ChainLog, ChainOutcome, StepLog, TaskResult};
pub use error::{ChainError, GeneratorError, TableError};
pub use final_query::{FinalAnswer, Verdict};
pub use generator::{Completion, GenerationOptions, Generator, PLACEHOLDER_COMPLETION};
pub use operations::{ChainRecord, Proposal, ProposeContext, TableOperation};
pub use planner::{PlanDecision, PlanLog};
pub use state_machine::{legal_next, ChainState, NextStep, Operation};
pub use table::{GroupFacts, SortFacts, SortValue, TableSnapshot, TraceEntry};
pub use types::{RawTable, Task, TaskId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving chains
    pub use crate::{
        ChainConfig, ChainDriver, Completion, GenerationOptions, Generator, GeneratorError,
        Operation, RawTable, Task, TaskId, TaskResult, Verdict,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
