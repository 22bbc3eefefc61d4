//! Write-once checkpoint store keyed by task identity
//!
//! Each finished task lands in `case-<blake3(identity)>.json` inside the
//! store directory. Entries are written through a temporary file in the same
//! directory and renamed without clobbering, so an existing entry is always
//! complete and always wins. A moka cache fronts the directory.

use crate::error::CheckpointError;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabchain_core::{ChainLog, Task, TaskId, TaskResult};
use tracing::debug;

/// Default number of entries kept in memory
pub const DEFAULT_HOT_CAPACITY: u64 = 4096;

/// Persisted record of one finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Input task
    pub task: Task,
    /// Result of the chain and the final query
    pub result: TaskResult,
    /// Step-by-step log
    pub log: ChainLog,
    /// When the task finished
    pub completed_at: DateTime<Utc>,
}

/// Checkpoint directory with an in-memory hot layer
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    hot: Cache<TaskId, Arc<CheckpointEntry>>,
}

impl CheckpointStore {
    /// Open (creating if needed) a store at `dir`
    ///
    /// # Errors
    /// `CheckpointError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        Self::with_capacity(dir, DEFAULT_HOT_CAPACITY)
    }

    /// Open with an explicit hot-layer capacity
    ///
    /// # Errors
    /// `CheckpointError::Io` if the directory cannot be created.
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: u64) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        Ok(Self {
            dir,
            hot: Cache::new(capacity),
        })
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File an identity maps to
    #[must_use]
    pub fn path_for(&self, id: &TaskId) -> PathBuf {
        let digest = blake3::hash(id.as_str().as_bytes());
        self.dir.join(format!("case-{}.json", digest.to_hex()))
    }

    /// Whether an entry exists for `id`
    ///
    /// # Errors
    /// Same as [`CheckpointStore::load`].
    pub async fn contains(&self, id: &TaskId) -> Result<bool, CheckpointError> {
        Ok(self.load(id).await?.is_some())
    }

    /// Load the entry for `id`, if any
    ///
    /// # Errors
    /// - `CheckpointError::Io` on read failures other than a missing file
    /// - `CheckpointError::Serialize` if the file is not a valid entry
    /// - `CheckpointError::IdentityMismatch` if the file holds another task
    pub async fn load(&self, id: &TaskId) -> Result<Option<Arc<CheckpointEntry>>, CheckpointError> {
        if let Some(entry) = self.hot.get(id).await {
            return Ok(Some(entry));
        }

        let path = self.path_for(id);
        let entry = blocking(move || read_entry(&path)).await?;
        let Some(entry) = entry else {
            return Ok(None);
        };
        if entry.task.id != *id {
            return Err(CheckpointError::IdentityMismatch {
                expected: id.clone(),
                found: entry.task.id.clone(),
            });
        }

        let entry = Arc::new(entry);
        self.hot.insert(id.clone(), Arc::clone(&entry)).await;
        debug!("checkpoint for {} loaded from disk", id);
        Ok(Some(entry))
    }

    /// Persist `entry` unless one already exists
    ///
    /// Returns whichever entry is authoritative afterwards.
    ///
    /// # Errors
    /// - `CheckpointError::Io` or `CheckpointError::Serialize` on write
    ///   failures
    /// - `CheckpointError::Io` when the path is taken but holds no entry;
    ///   nothing is cached in that case
    pub async fn persist(&self, entry: CheckpointEntry) -> Result<Arc<CheckpointEntry>, CheckpointError> {
        let id = entry.task.id.clone();
        let path = self.path_for(&id);
        let dir = self.dir.clone();
        let bytes = serde_json::to_vec_pretty(&entry)?;

        let target = path.clone();
        let written = blocking(move || write_once(&dir, &target, &bytes)).await?;
        if !written {
            debug!("checkpoint for {} already present, keeping it", id);
            self.hot.invalidate(&id).await;
            return self.load(&id).await?.ok_or_else(|| {
                CheckpointError::io(
                    path,
                    std::io::Error::new(ErrorKind::NotFound, "existing checkpoint is unreadable"),
                )
            });
        }

        let entry = Arc::new(entry);
        self.hot.insert(id, Arc::clone(&entry)).await;
        Ok(entry)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, CheckpointError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CheckpointError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CheckpointError::io(PathBuf::new(), std::io::Error::other(e)))?
}

fn read_entry(path: &Path) -> Result<Option<CheckpointEntry>, CheckpointError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CheckpointError::io(path, e)),
    }
}

/// `false` when the target already existed
fn write_once(dir: &Path, path: &Path, bytes: &[u8]) -> Result<bool, CheckpointError> {
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| CheckpointError::io(dir, e))?;
    file.write_all(bytes).map_err(|e| CheckpointError::io(file.path(), e))?;
    file.as_file().sync_all().map_err(|e| CheckpointError::io(file.path(), e))?;

    match file.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(CheckpointError::io(path, e.error)),
    }
}
