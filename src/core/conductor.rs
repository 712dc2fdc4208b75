//! Conductor facade: the single entry point callers use to run the
//! pipeline for a practice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::engine::PipelineEngine;
use super::settings::PipelineSettings;
use crate::adapters::Notifier;
use crate::domain::{Checkpoint, NewRun, PipelineState, Run, RunStatus, Stage, Trigger};
use crate::error::ConductorError;
use crate::stages::{Providers, Stages};
use crate::store::{RunStore, StoreError};

/// Caller-facing outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorResult {
    pub run_id: Uuid,

    /// Always `completed` or `failed`
    pub status: RunStatus,

    pub content_pieces_generated: usize,
    pub scholar_keywords: usize,

    /// Set only when the run failed
    pub error: Option<String>,
}

impl ConductorResult {
    /// Build the result from a state returned by the engine
    pub fn from_state(state: &PipelineState) -> Self {
        let (status, error) = match state.stage {
            Stage::Completed => (RunStatus::Completed, None),
            Stage::Failed => (
                RunStatus::Failed,
                Some(
                    state
                        .error
                        .clone()
                        .unwrap_or_else(|| "run failed without an error message".to_string()),
                ),
            ),
            other => (
                RunStatus::Failed,
                Some(format!("run stopped at non-terminal stage {}", other)),
            ),
        };

        Self {
            run_id: state.run_id,
            status,
            content_pieces_generated: state
                .summary
                .as_ref()
                .map_or_else(|| state.drafts_produced(), |s| s.drafts_produced),
            scholar_keywords: state.topic_count,
            error,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Parameters of a new run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub practice_id: String,
    pub organization_id: String,
    pub trigger: Trigger,
}

impl RunRequest {
    pub fn new(practice_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            practice_id: practice_id.into(),
            organization_id: organization_id.into(),
            trigger: Trigger::Manual,
        }
    }

    /// Mark the run as started by a scheduler rather than a person
    pub fn scheduled(mut self) -> Self {
        self.trigger = Trigger::Scheduled;
        self
    }

    fn validate(&self) -> Result<(), ConductorError> {
        if self.practice_id.trim().is_empty() {
            return Err(ConductorError::Validation(
                "practice id must not be empty".to_string(),
            ));
        }
        if self.organization_id.trim().is_empty() {
            return Err(ConductorError::Validation(
                "organization id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Conductor {
    store: Arc<dyn RunStore>,
    engine: PipelineEngine,
    settings: PipelineSettings,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Conductor {
    /// Wire the pipeline from a store, the external providers and settings
    pub fn new(
        store: Arc<dyn RunStore>,
        providers: Providers,
        settings: PipelineSettings,
    ) -> Result<Self, ConductorError> {
        settings.validate()?;
        let stages = Stages::new(providers, &settings);
        let engine = PipelineEngine::new(Arc::clone(&store), stages);

        Ok(Self {
            store,
            engine,
            settings,
            notifier: None,
        })
    }

    /// Tell `notifier` about every finished run
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run the full pipeline for a practice.
    ///
    /// Stage failures come back as a `failed` result, not as `Err`.
    pub async fn run(
        &self,
        practice_id: &str,
        organization_id: &str,
    ) -> Result<ConductorResult, ConductorError> {
        self.run_request(RunRequest::new(practice_id, organization_id))
            .await
    }

    #[instrument(
        skip(self, request),
        fields(practice_id = %request.practice_id, trigger = %request.trigger)
    )]
    pub async fn run_request(
        &self,
        request: RunRequest,
    ) -> Result<ConductorResult, ConductorError> {
        request.validate()?;

        let run = self
            .store
            .create(NewRun {
                organization_id: request.organization_id,
                practice_id: request.practice_id,
                graph_version: self.settings.graph_version.clone(),
                trigger: request.trigger,
                config: self.settings.to_snapshot(),
            })
            .await?;
        info!(run_id = %run.id, "Run started");

        let state = PipelineState::new(run.id, run.practice_id, run.organization_id);
        let state = self.engine.execute(state).await;
        Ok(self.finish(state).await)
    }

    /// Continue an interrupted run from its last checkpoint
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: Uuid) -> Result<ConductorResult, ConductorError> {
        let run = self.get_run(run_id).await?;
        if run.is_finished() {
            return Err(ConductorError::State(format!(
                "run {} is already {}; start a new run instead",
                run_id, run.status
            )));
        }

        let state = match &run.checkpoint {
            None => PipelineState::new(
                run.id,
                run.practice_id.clone(),
                run.organization_id.clone(),
            ),
            Some(snapshot) => PipelineState::from_snapshot(snapshot).map_err(|e| {
                ConductorError::State(format!("checkpoint of run {} is unreadable: {}", run_id, e))
            })?,
        };
        if state.run_id != run.id {
            return Err(ConductorError::State(format!(
                "checkpoint of run {} belongs to run {}",
                run_id, state.run_id
            )));
        }

        info!(stage = %state.stage, "Resuming run from checkpoint");
        let state = self.engine.execute(state).await;
        Ok(self.finish(state).await)
    }

    /// Load one run record
    pub async fn get_run(&self, run_id: Uuid) -> Result<Run, ConductorError> {
        self.store
            .get(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id).into())
    }

    /// Most recent runs first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<Run>, ConductorError> {
        Ok(self.store.list_recent(limit).await?)
    }

    /// Checkpoint history of a run, oldest first
    pub async fn checkpoints(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, ConductorError> {
        Ok(self.store.checkpoints(run_id).await?)
    }

    async fn finish(&self, state: PipelineState) -> ConductorResult {
        let result = ConductorResult::from_state(&state);
        if !state.stage.is_terminal() {
            error!(stage = %state.stage, "Engine returned a non-terminal state");
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&result).await {
                warn!(run_id = %result.run_id, error = %e, "Run notification failed");
            }
        }
        result
    }
}
