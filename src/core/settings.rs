//! Tunables for pipeline execution.
//!
//! Read from the `pipeline` section of the config file. Every field has a
//! default, so an empty section is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Snapshot;
use crate::error::ConductorError;

/// Limits and thresholds applied by the stage handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Version label recorded on every run (default: "v1")
    #[serde(default = "default_graph_version")]
    pub graph_version: String,

    /// Maximum topics kept by the scholar stage (default: 10)
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Drafts in flight at once (default: 3)
    #[serde(default = "default_ghostwriter_concurrency")]
    pub ghostwriter_concurrency: usize,

    /// Per-topic drafting timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_draft_timeout")]
    pub draft_timeout_seconds: u64,

    /// Days without publishing before a practice counts as stale (default: 30)
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    /// Days without publishing before a practice counts as dormant (default: 90)
    #[serde(default = "default_dormant_after_days")]
    pub dormant_after_days: i64,
}

fn default_graph_version() -> String {
    "v1".to_string()
}
fn default_max_topics() -> usize {
    10
}
fn default_ghostwriter_concurrency() -> usize {
    3
}
fn default_draft_timeout() -> u64 {
    300
} // 5 min
fn default_stale_after_days() -> i64 {
    30
}
fn default_dormant_after_days() -> i64 {
    90
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            graph_version: default_graph_version(),
            max_topics: default_max_topics(),
            ghostwriter_concurrency: default_ghostwriter_concurrency(),
            draft_timeout_seconds: default_draft_timeout(),
            stale_after_days: default_stale_after_days(),
            dormant_after_days: default_dormant_after_days(),
        }
    }
}

impl PipelineSettings {
    /// Reject settings no run could execute with
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.graph_version.trim().is_empty() {
            return Err(ConductorError::Validation(
                "pipeline.graph_version must not be empty".to_string(),
            ));
        }
        if self.max_topics == 0 {
            return Err(ConductorError::Validation(
                "pipeline.max_topics must be at least 1".to_string(),
            ));
        }
        if self.ghostwriter_concurrency == 0 {
            return Err(ConductorError::Validation(
                "pipeline.ghostwriter_concurrency must be at least 1".to_string(),
            ));
        }
        if self.draft_timeout_seconds == 0 {
            return Err(ConductorError::Validation(
                "pipeline.draft_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.stale_after_days < 0 || self.stale_after_days > self.dormant_after_days {
            return Err(ConductorError::Validation(format!(
                "pipeline.stale_after_days ({}) must be between 0 and dormant_after_days ({})",
                self.stale_after_days, self.dormant_after_days
            )));
        }
        Ok(())
    }

    pub fn draft_timeout(&self) -> Duration {
        Duration::from_secs(self.draft_timeout_seconds)
    }

    /// Settings as recorded in a run's config snapshot
    pub fn to_snapshot(&self) -> Snapshot {
        let mut config = Snapshot::new();
        config.insert("graph_version".into(), self.graph_version.clone().into());
        config.insert("max_topics".into(), self.max_topics.into());
        config.insert(
            "ghostwriter_concurrency".into(),
            self.ghostwriter_concurrency.into(),
        );
        config.insert(
            "draft_timeout_seconds".into(),
            self.draft_timeout_seconds.into(),
        );
        config.insert("stale_after_days".into(), self.stale_after_days.into());
        config.insert("dormant_after_days".into(), self.dormant_after_days.into());
        config
    }
}
