//! Chain driver
//!
//! Runs one task: plan, propose, apply, repeat until `<END>` or the step
//! cap, then hand the final snapshot to the final query. Each propose stage
//! sees the latest snapshot, and the record it leaves behind replays to
//! the same snapshot without the Generator.

use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::final_query::{self, FinalAnswer};
use crate::generator::Generator;
use crate::operations::{self, ChainRecord, ProposeContext};
use crate::planner::{self, PlanLog};
use crate::state_machine::{NextStep, Operation};
use crate::table::{TableSnapshot, TraceEntry};
use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One executed operation as recorded in the task log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    /// Operation run
    pub operation: Operation,
    /// Ranked candidates the propose stage returned
    pub candidate_count: usize,
    /// Trace entry the apply stage appended
    pub entry: TraceEntry,
    /// Whether the step changed the table state
    pub kept: bool,
}

/// Step-by-step log of one task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
    /// Planner decisions in order
    pub plans: Vec<PlanLog>,
    /// Executed operations in order
    pub steps: Vec<StepLog>,
}

/// Result of the operation chain, before the final query
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// Final snapshot
    pub snapshot: TableSnapshot,
    /// Proposals in execution order
    pub record: ChainRecord,
    /// Step log
    pub log: ChainLog,
}

/// Final result of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Final-query answer and verdict
    pub answer: FinalAnswer,
    /// Snapshot the final query saw
    pub snapshot: TableSnapshot,
    /// Proposals in execution order
    pub record: ChainRecord,
}

impl TaskResult {
    /// Whether the verdict agrees with a ground-truth label
    #[must_use]
    pub fn matches_label(&self, label: u8) -> bool {
        self.answer.verdict.matches_label(label)
    }
}

/// Drives tasks against one Generator and configuration
#[derive(Clone)]
pub struct ChainDriver {
    generator: Arc<dyn Generator>,
    config: ChainConfig,
}

impl std::fmt::Debug for ChainDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainDriver")
            .field("generator", &self.generator.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ChainDriver {
    /// Create driver
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, config: ChainConfig) -> Self {
        Self { generator, config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run the operation chain of one task
    ///
    /// # Errors
    /// - `ChainError::Table` if the raw table is malformed
    /// - `ChainError::Generator` if any Generator call fails
    pub async fn run_chain(&self, task: &Task) -> Result<ChainOutcome, ChainError> {
        let generator = self.generator.as_ref();
        let mut snapshot = task.initial_snapshot()?;
        let mut record = ChainRecord::new();
        let mut log = ChainLog::default();

        info!("chain start for task {}", task.id);
        loop {
            let decision = planner::plan(generator, &snapshot, &task.statement, &self.config).await?;
            let next = decision.next;
            log.plans.push(decision.log);

            let NextStep::Apply(operation) = next else {
                break;
            };
            if record.len() >= self.config.max_steps {
                warn!(
                    "task {} hit the step cap of {} with {} still planned",
                    task.id, self.config.max_steps, operation
                );
                break;
            }

            let options = self.config.options_for(operation);
            let ctx = ProposeContext::new(task, &snapshot, options);
            let proposal = operations::propose(operation, generator, &ctx).await?;
            let applied = proposal.apply(&snapshot, &self.config.apply);

            let entry = applied
                .trace()
                .last()
                .cloned()
                .unwrap_or_else(|| TraceEntry::skip(operation));
            debug!("task {} step {}: {}", task.id, record.len() + 1, entry);
            log.steps.push(StepLog {
                operation,
                candidate_count: proposal.candidate_count(),
                kept: !entry.skipped,
                entry,
            });
            record.push(proposal);
            snapshot = applied;
        }
        info!("chain done for task {} after {} steps", task.id, record.len());

        Ok(ChainOutcome {
            snapshot,
            record,
            log,
        })
    }

    /// Run the chain and the final query of one task
    ///
    /// # Errors
    /// Same as [`ChainDriver::run_chain`].
    pub async fn verify(&self, task: &Task) -> Result<(TaskResult, ChainLog), ChainError> {
        let outcome = self.run_chain(task).await?;
        let answer = final_query::query(self.generator.as_ref(), task, &outcome.snapshot, &self.config).await?;
        info!("task {} verdict {}", task.id, answer.verdict);
        Ok((
            TaskResult {
                answer,
                snapshot: outcome.snapshot,
                record: outcome.record,
            },
            outcome.log,
        ))
    }
}
