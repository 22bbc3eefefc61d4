//! Batch executor
//!
//! A fixed pool of tokio workers pulls chunks of tasks from one shared
//! queue. Each task first checks the checkpoint store; a hit is returned as
//! is, a miss runs the full chain and is persisted before it is reported.
//! Failures and panics are caught per task, logged with the task identity
//! and reported as absent results.

use crate::checkpoint::{CheckpointEntry, CheckpointStore};
use crate::error::BatchError;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tabchain_core::{ChainDriver, Task, TaskId};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};
use ulid::Ulid;

/// Worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Tasks per queued job
    pub chunk_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            chunk_size: 1,
        }
    }
}

impl BatchConfig {
    /// Set worker count (at least one)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set chunk size (at least one)
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Counters of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Tasks submitted
    pub total: usize,
    /// Tasks run against the Generator
    pub executed: usize,
    /// Tasks served from the checkpoint store
    pub cached: usize,
    /// Tasks that failed or panicked
    pub failed: usize,
}

/// Outcome of one batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Run identifier
    pub run_id: Ulid,
    /// One slot per submitted task, in submission order; `None` on failure
    pub results: Vec<Option<Arc<CheckpointEntry>>>,
    /// Counters
    pub stats: BatchStats,
}

impl BatchReport {
    /// Completed entries in submission order
    pub fn completed(&self) -> impl Iterator<Item = &CheckpointEntry> {
        self.results.iter().flatten().map(Arc::as_ref)
    }

    /// Share of labelled, completed tasks whose verdict matches the label
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> Option<f64> {
        let (hits, labelled) = self
            .completed()
            .filter_map(|entry| entry.task.label.map(|label| entry.result.matches_label(label)))
            .fold((0usize, 0usize), |(hits, n), hit| (hits + usize::from(hit), n + 1));
        (labelled > 0).then(|| hits as f64 / labelled as f64)
    }
}

enum TaskOutcome {
    Executed(Arc<CheckpointEntry>),
    Cached(Arc<CheckpointEntry>),
    Failed,
}

type Job = Vec<(usize, Task)>;

/// Runs batches of tasks over a worker pool
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    driver: ChainDriver,
    store: CheckpointStore,
    config: BatchConfig,
}

impl BatchExecutor {
    /// Create executor
    #[must_use]
    pub fn new(driver: ChainDriver, store: CheckpointStore, config: BatchConfig) -> Self {
        Self {
            driver,
            store,
            config,
        }
    }

    /// Checkpoint store in use
    #[inline]
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run every task, resuming from the checkpoint store
    pub async fn run(&self, tasks: Vec<Task>) -> BatchReport {
        let run_id = Ulid::new();
        let total = tasks.len();
        let workers = self.config.workers.max(1);
        let chunk_size = self.config.chunk_size.max(1);
        info!(
            "batch {} start: {} tasks, {} workers, chunk size {}",
            run_id, total, workers, chunk_size
        );

        let (job_tx, job_rx) = mpsc::channel::<Job>(workers * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<(usize, TaskOutcome)>();

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                tokio::spawn(worker(
                    self.driver.clone(),
                    self.store.clone(),
                    Arc::clone(&job_rx),
                    out_tx.clone(),
                ))
            })
            .collect();
        drop(out_tx);

        let mut indexed = tasks.into_iter().enumerate().peekable();
        while indexed.peek().is_some() {
            let job: Job = indexed.by_ref().take(chunk_size).collect();
            if job_tx.send(job).await.is_err() {
                error!("batch {} lost every worker before the queue drained", run_id);
                break;
            }
        }
        drop(job_tx);

        let mut results: Vec<Option<Arc<CheckpointEntry>>> = vec![None; total];
        let mut stats = BatchStats {
            total,
            ..BatchStats::default()
        };
        while let Some((index, outcome)) = out_rx.recv().await {
            match outcome {
                TaskOutcome::Executed(entry) => {
                    stats.executed += 1;
                    results[index] = Some(entry);
                }
                TaskOutcome::Cached(entry) => {
                    stats.cached += 1;
                    results[index] = Some(entry);
                }
                TaskOutcome::Failed => {}
            }
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("batch {} worker stopped abnormally: {}", run_id, e);
            }
        }
        // includes tasks a dead worker never reported
        stats.failed = total - stats.executed - stats.cached;

        info!(
            "batch {} done: {} executed, {} cached, {} failed",
            run_id, stats.executed, stats.cached, stats.failed
        );
        BatchReport {
            run_id,
            results,
            stats,
        }
    }
}

async fn worker(
    driver: ChainDriver,
    store: CheckpointStore,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    out: mpsc::UnboundedSender<(usize, TaskOutcome)>,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        for (index, task) in job {
            let outcome = run_guarded(&driver, &store, task).await;
            if out.send((index, outcome)).is_err() {
                return;
            }
        }
    }
}

async fn run_guarded(driver: &ChainDriver, store: &CheckpointStore, task: Task) -> TaskOutcome {
    let id = task.id.clone();
    let result = AssertUnwindSafe(run_task(driver, store, task))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(BatchError::Panicked(panic_message(payload.as_ref()))));

    match result {
        Ok((entry, true)) => TaskOutcome::Cached(entry),
        Ok((entry, false)) => TaskOutcome::Executed(entry),
        Err(e) => {
            log_failure(&id, &e);
            TaskOutcome::Failed
        }
    }
}

/// `(entry, cached)`
async fn run_task(
    driver: &ChainDriver,
    store: &CheckpointStore,
    task: Task,
) -> Result<(Arc<CheckpointEntry>, bool), BatchError> {
    if let Some(entry) = store.load(&task.id).await? {
        debug!("task {} served from checkpoint", task.id);
        return Ok((entry, true));
    }

    let (result, log) = driver.verify(&task).await?;
    let entry = store
        .persist(CheckpointEntry {
            task,
            result,
            log,
            completed_at: Utc::now(),
        })
        .await?;
    Ok((entry, false))
}

fn log_failure(id: &TaskId, err: &BatchError) {
    error!("task {} failed: {}", id, err);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("bang");
        let other: Box<dyn std::any::Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(owned.as_ref()), "boom");
        assert_eq!(panic_message(borrowed.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn config_floors_at_one() {
        let config = BatchConfig::default().with_workers(0).with_chunk_size(0);
        assert_eq!(config, BatchConfig { workers: 1, chunk_size: 1 });
    }
}
