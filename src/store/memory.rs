//! In-process run store.
//!
//! Same semantics as the SQLite store; used by tests and by embedders that
//! do not need records to outlive the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{snapshot_hash, RunStore, StoreError};
use crate::domain::{Checkpoint, NewRun, Run, RunStatus, Snapshot, Stage};

struct StoredRun {
    run: Run,
    history: Vec<Checkpoint>,
}

/// Run store backed by a `HashMap`
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs ever created
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, new_run: NewRun) -> Result<Run, StoreError> {
        let run = new_run.into_run();
        self.runs.write().await.insert(
            run.id,
            StoredRun {
                run: run.clone(),
                history: Vec::new(),
            },
        );
        Ok(run)
    }

    async fn checkpoint(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        stage: Stage,
    ) -> Result<bool, StoreError> {
        let hash = snapshot_hash(snapshot)?;
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;

        if stored.run.is_finished() {
            return Err(StoreError::AlreadyFinished(run_id));
        }
        if stored
            .history
            .iter()
            .any(|c| c.stage == stage && c.snapshot_hash == hash)
        {
            return Ok(false);
        }
        if stage.precedes(stored.run.stage) {
            return Err(StoreError::StageRegression {
                run_id,
                stage,
                current: stored.run.stage,
            });
        }

        stored.run.stage = stage;
        stored.run.checkpoint = Some(snapshot.clone());
        let seq = stored.history.len() as u64 + 1;
        stored.history.push(Checkpoint {
            run_id,
            seq,
            stage,
            snapshot: snapshot.clone(),
            snapshot_hash: hash,
            recorded_at: Utc::now(),
        });
        Ok(true)
    }

    async fn complete(&self, run_id: Uuid, result: &Snapshot) -> Result<bool, StoreError> {
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;

        if stored.run.is_finished() {
            return Ok(false);
        }
        stored.run.status = RunStatus::Completed;
        stored.run.stage = Stage::Completed;
        stored.run.result = Some(result.clone());
        stored.run.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn fail(&self, run_id: Uuid, error: &str) -> Result<bool, StoreError> {
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;

        if stored.run.is_finished() {
            return Ok(false);
        }
        stored.run.status = RunStatus::Failed;
        stored.run.error = Some(error.to_string());
        stored.run.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.get(&run_id).map(|s| s.run.clone()))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .await
            .values()
            .map(|s| s.run.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn checkpoints(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, StoreError> {
        let runs = self.runs.read().await;
        let stored = runs.get(&run_id).ok_or(StoreError::NotFound(run_id))?;
        Ok(stored.history.clone())
    }
}
