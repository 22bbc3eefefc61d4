//! tabchain batch - resumable execution of many verification tasks
//!
//! - [`CheckpointStore`]: write-once, content-addressed result files
//! - [`BatchExecutor`]: fixed-size worker pool with per-task failure isolation
//! - [`dataset`]: TabFact-style JSONL loading
//!
//! # Example
//!
//! ```rust,ignore
//! use tabchain_batch::{BatchConfig, BatchExecutor, CheckpointStore};
//!
//! let store = CheckpointStore::open("out/cache")?;
//! let executor = BatchExecutor::new(driver, store, BatchConfig::default());
//! let report = executor.run(tasks).await;
//! println!("{} executed, {} cached", report.stats.executed, report.stats.cached);
//! ```

#![warn(unreachable_pub)]

pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod executor;

pub use checkpoint::{CheckpointEntry, CheckpointStore};
pub use dataset::{parse_jsonl, read_jsonl, CleanedStatements};
pub use error::{BatchError, CheckpointError, DatasetError};
pub use executor::{BatchConfig, BatchExecutor, BatchReport, BatchStats};
