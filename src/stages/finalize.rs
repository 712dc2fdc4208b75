//! Finalize: summarize the run into its persisted result.

use tracing::info;

use crate::domain::{PipelineState, RunSummary, Snapshot};
use crate::error::ConductorError;

pub struct Finalize;

impl Finalize {
    pub fn run(&self, state: &PipelineState) -> Result<RunSummary, ConductorError> {
        let topics = state.topics.as_ref().ok_or_else(|| {
            ConductorError::State("finalize stage reached without scholar topics".to_string())
        })?;
        if topics.len() != state.topic_count {
            return Err(ConductorError::State(format!(
                "topic count {} does not match {} recorded topics",
                state.topic_count,
                topics.len()
            )));
        }
        if state.drafts.len() > topics.len() {
            return Err(ConductorError::State(format!(
                "{} draft results for {} topics",
                state.drafts.len(),
                topics.len()
            )));
        }

        let content_ids: Vec<String> = state
            .drafts
            .iter()
            .filter(|d| d.success)
            .filter_map(|d| d.content_id.clone())
            .collect();
        let summary = RunSummary {
            topics_found: topics.len(),
            drafts_produced: content_ids.len(),
            drafts_failed: state.drafts.len() - content_ids.len(),
            content_ids,
            freshness: state.health.as_ref().map(|h| h.freshness),
        };

        info!(
            topics_found = summary.topics_found,
            drafts_produced = summary.drafts_produced,
            drafts_failed = summary.drafts_failed,
            "Run summarized"
        );
        Ok(summary)
    }
}

/// Encode a summary as the run's result snapshot
pub fn result_snapshot(summary: &RunSummary) -> Result<Snapshot, ConductorError> {
    match serde_json::to_value(summary) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ConductorError::State(format!(
            "run summary encoded as {} instead of an object",
            other
        ))),
        Err(e) => Err(ConductorError::State(format!(
            "could not encode run summary: {}",
            e
        ))),
    }
}
