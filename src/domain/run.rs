//! Persisted run records.
//!
//! A Run is one execution of the conductor pipeline for one practice. The
//! record is created before any stage runs and is only ever mutated by the
//! engine (checkpoints) and the terminal `complete`/`fail` transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{Snapshot, Stage};

/// Agent name recorded on every run produced by this crate
pub const AGENT_NAME: &str = "conductor";

/// A persisted pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Organization that owns the practice
    pub organization_id: String,

    /// Practice the pipeline was run for
    pub practice_id: String,

    /// Always [`AGENT_NAME`]
    pub agent: String,

    /// Graph/version tag of the pipeline that produced the run
    pub graph_version: String,

    /// Current status of the run
    pub status: RunStatus,

    /// What started the run
    pub trigger: Trigger,

    /// Settings the run was started with
    pub config: Snapshot,

    /// Run summary, present only once completed
    pub result: Option<Snapshot>,

    /// Error message if failed
    pub error: Option<String>,

    /// Marker of the last checkpointed stage
    pub stage: Stage,

    /// Latest checkpoint snapshot of the pipeline state
    pub checkpoint: Option<Snapshot>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Check if the run has reached `completed` or `failed`
    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }
}

/// Everything needed to allocate a new run record
#[derive(Debug, Clone)]
pub struct NewRun {
    pub organization_id: String,
    pub practice_id: String,
    pub graph_version: String,
    pub trigger: Trigger,
    pub config: Snapshot,
}

impl NewRun {
    /// Materialize the record with a fresh id and start time
    pub fn into_run(self) -> Run {
        Run {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            practice_id: self.practice_id,
            agent: AGENT_NAME.to_string(),
            graph_version: self.graph_version,
            status: RunStatus::Running,
            trigger: self.trigger,
            config: self.config,
            result: None,
            error: None,
            stage: Stage::Init,
            checkpoint: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One entry of a run's checkpoint history (the audit trail)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: Uuid,

    /// Position in the run's history, starting at 1
    pub seq: u64,

    pub stage: Stage,
    pub snapshot: Snapshot,

    /// Digest of the canonical snapshot JSON
    pub snapshot_hash: String,

    pub recorded_at: DateTime<Utc>,
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Manual
    }
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(format!("unknown trigger '{}'", other)),
        }
    }
}
