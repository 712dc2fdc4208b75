//! Pipeline stages and the working state threaded through them.
//!
//! `Stage` is a closed set with a fixed forward order. `PipelineState` keeps
//! one optional field per stage output, so a stage can only see what earlier
//! stages actually produced.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::practice::PracticeProfile;
use super::topic::{DraftResult, Topic};
use crate::error::ConductorError;

/// Opaque key-value map persisted for configs, results and checkpoints
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

/// A named step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    HealthCheck,
    Scholar,
    Ghostwriter,
    Finalize,
    Completed,
    Failed,
}

impl Stage {
    /// The happy path, in order
    pub const ORDER: [Stage; 6] = [
        Stage::Init,
        Stage::HealthCheck,
        Stage::Scholar,
        Stage::Ghostwriter,
        Stage::Finalize,
        Stage::Completed,
    ];

    /// Next stage on success, `None` once terminal
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::HealthCheck),
            Stage::HealthCheck => Some(Stage::Scholar),
            Stage::Scholar => Some(Stage::Ghostwriter),
            Stage::Ghostwriter => Some(Stage::Finalize),
            Stage::Finalize => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether `self` comes strictly before `other` on the happy path.
    /// `failed` is off the path and never precedes anything.
    pub fn precedes(self, other: Stage) -> bool {
        let position = |stage: Stage| Self::ORDER.iter().position(|s| *s == stage);
        matches!((position(self), position(other)), (Some(a), Some(b)) if a < b)
    }

    /// Any non-terminal stage may fail; otherwise only the next stage is allowed
    pub fn can_transition_to(self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Failed || self.next() == Some(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::HealthCheck => "health_check",
            Stage::Scholar => "scholar",
            Stage::Ghostwriter => "ghostwriter",
            Stage::Finalize => "finalize",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Init
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Stage::Init),
            "health_check" => Ok(Stage::HealthCheck),
            "scholar" => Ok(Stage::Scholar),
            "ghostwriter" => Ok(Stage::Ghostwriter),
            "finalize" => Ok(Stage::Finalize),
            "completed" => Ok(Stage::Completed),
            "failed" => Ok(Stage::Failed),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// How recently the practice published content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    Dormant,
}

/// Output of the health check stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub practice: PracticeProfile,

    /// Days since the last published piece, `None` if never published
    pub days_since_last_publish: Option<i64>,

    pub freshness: Freshness,
    pub checked_at: DateTime<Utc>,
}

/// Output of the finalize stage; becomes the run result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub topics_found: usize,
    pub drafts_produced: usize,
    pub drafts_failed: usize,
    pub content_ids: Vec<String>,
    pub freshness: Option<Freshness>,
}

/// Working state for one run, owned by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub practice_id: String,
    pub organization_id: String,

    /// Last stage entered
    pub stage: Stage,

    #[serde(default)]
    pub health: Option<HealthReport>,

    #[serde(default)]
    pub topic_count: usize,

    /// `None` until the scholar stage completes
    #[serde(default)]
    pub topics: Option<Vec<Topic>>,

    /// One entry per drafted topic, in topic order
    #[serde(default)]
    pub drafts: Vec<DraftResult>,

    #[serde(default)]
    pub summary: Option<RunSummary>,

    #[serde(default)]
    pub error: Option<String>,
}

impl PipelineState {
    /// Initial state for a fresh run
    pub fn new(run_id: Uuid, practice_id: String, organization_id: String) -> Self {
        Self {
            run_id,
            practice_id,
            organization_id,
            stage: Stage::Init,
            health: None,
            topic_count: 0,
            topics: None,
            drafts: Vec::new(),
            summary: None,
            error: None,
        }
    }

    /// Move to `to`, refusing anything but a forward step or a failure
    pub fn advance(&mut self, to: Stage) -> Result<(), ConductorError> {
        if !self.stage.can_transition_to(to) {
            return Err(ConductorError::State(format!(
                "cannot move run {} from {} to {}",
                self.run_id, self.stage, to
            )));
        }
        self.stage = to;
        Ok(())
    }

    /// Number of drafts that produced content
    pub fn drafts_produced(&self) -> usize {
        self.drafts.iter().filter(|d| d.success).count()
    }

    /// Encode as a checkpoint snapshot
    pub fn to_snapshot(&self) -> Result<Snapshot, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "pipeline state encoded as {} instead of an object",
                other
            ))),
        }
    }

    /// Decode a checkpoint snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(snapshot.clone()))
    }
}
