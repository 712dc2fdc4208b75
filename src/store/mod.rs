//! Persistent run records.
//!
//! One record per pipeline execution, plus an append-only checkpoint history
//! that serves as the run's audit trail. Terminal transitions are single-use
//! and checkpoint writes are idempotent, so retried callers cannot corrupt a
//! record.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Checkpoint, NewRun, Run, Snapshot, Stage};

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

/// Errors raised by run store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error("Run {0} has already finished")]
    AlreadyFinished(Uuid),

    #[error("Checkpoint at {stage} would move run {run_id} back from {current}")]
    StageRegression {
        run_id: Uuid,
        stage: Stage,
        current: Stage,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt run record: {0}")]
    Corrupt(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Storage contract used by the engine and facade
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Allocate a new record with a generated id and start time
    async fn create(&self, new_run: NewRun) -> Result<Run, StoreError>;

    /// Overwrite the checkpoint and stage marker.
    ///
    /// Returns `false` when the same snapshot was already recorded at the
    /// same stage anywhere in the history, in which case nothing is written.
    /// A new snapshot at a stage before the current marker is refused with
    /// `StageRegression`.
    async fn checkpoint(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        stage: Stage,
    ) -> Result<bool, StoreError>;

    /// Mark the run completed and move its stage marker to `completed`.
    /// A no-op returning `false` once terminal.
    async fn complete(&self, run_id: Uuid, result: &Snapshot) -> Result<bool, StoreError>;

    /// Mark the run failed, leaving the stage marker on the stage that
    /// failed. A no-op returning `false` once terminal.
    async fn fail(&self, run_id: Uuid, error: &str) -> Result<bool, StoreError>;

    /// Load a run by id
    async fn get(&self, run_id: Uuid) -> Result<Option<Run>, StoreError>;

    /// Most recently started runs first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, StoreError>;

    /// Checkpoint history of a run, oldest first
    async fn checkpoints(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, StoreError>;
}

/// Hash a snapshot (first 16 hex chars of SHA256 over its JSON encoding)
///
/// `serde_json::Map` keeps keys sorted, so equal snapshots encode identically.
pub fn snapshot_hash(snapshot: &Snapshot) -> Result<String, StoreError> {
    let json = serde_json::to_string(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..8]))
}
