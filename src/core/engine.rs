//! Pipeline engine: drives one run through its stages.
//!
//! The engine is the only writer of stage transitions and run records.
//! It checkpoints after every successful stage, so a run that dies midway
//! can be resumed from its last checkpoint. `execute` always returns a
//! terminal state; failures are folded into the state, never raised.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use serde_json::Value;

use crate::domain::{PipelineState, RunStatus, RunSummary, Stage};
use crate::error::ConductorError;
use crate::stages::{finalize, Stages};
use crate::store::{RunStore, StoreError};

pub struct PipelineEngine {
    store: Arc<dyn RunStore>,
    stages: Stages,
}

impl PipelineEngine {
    pub fn new(store: Arc<dyn RunStore>, stages: Stages) -> Self {
        Self { store, stages }
    }

    /// Run from the state's current stage to a terminal stage.
    ///
    /// A fresh state (stage `init`) is checkpointed before the first
    /// stage. A state restored from a checkpoint continues with the stage
    /// after the one it was recorded at; one that carries an error is
    /// failed without running anything.
    #[instrument(
        skip(self, state),
        fields(run_id = %state.run_id, practice_id = %state.practice_id)
    )]
    pub async fn execute(&self, mut state: PipelineState) -> PipelineState {
        if state.stage.is_terminal() {
            warn!(stage = %state.stage, "Run is already terminal, nothing to execute");
            return state;
        }
        if let Some(message) = state.error.clone() {
            return self.fail_run(state, ConductorError::State(message)).await;
        }
        if state.stage == Stage::Init {
            if let Err(e) = self.checkpoint(&state).await {
                return self.fail_run(state, e).await;
            }
        }

        loop {
            let next = match state.stage.next() {
                Some(next) => next,
                None => return state,
            };
            if next == Stage::Completed {
                return self.complete_run(state).await;
            }
            if let Err(e) = state.advance(next) {
                return self.fail_run(state, e).await;
            }

            info!(stage = %next, "Entering stage");
            let started = Instant::now();

            match self.run_stage(&mut state).await {
                Ok(()) => {
                    info!(
                        stage = %next,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Stage completed"
                    );
                    if let Err(e) = self.checkpoint(&state).await {
                        return self.fail_run(state, e).await;
                    }
                }
                Err(e) => {
                    error!(stage = %next, kind = e.kind(), error = %e, "Stage failed");
                    state.error = Some(e.to_string());
                    if let Err(checkpoint_err) = self.checkpoint(&state).await {
                        warn!(error = %checkpoint_err, "Could not checkpoint failed stage");
                    }
                    return self.fail_run(state, e).await;
                }
            }
        }
    }

    async fn run_stage(&self, state: &mut PipelineState) -> Result<(), ConductorError> {
        match state.stage {
            Stage::HealthCheck => {
                let health = self.stages.health_check.run(state).await?;
                state.health = Some(health);
            }
            Stage::Scholar => {
                let topics = self.stages.scholar.run(state).await?;
                state.topic_count = topics.len();
                state.topics = Some(topics);
            }
            Stage::Ghostwriter => {
                let drafts = self.stages.ghostwriter.run(state).await?;
                state.drafts = drafts;
            }
            Stage::Finalize => {
                let summary = self.stages.finalize.run(state)?;
                state.summary = Some(summary);
            }
            other => {
                return Err(ConductorError::State(format!(
                    "no handler for stage {}",
                    other
                )));
            }
        }
        Ok(())
    }

    async fn checkpoint(&self, state: &PipelineState) -> Result<(), ConductorError> {
        let snapshot = state.to_snapshot().map_err(StoreError::from)?;
        let written = self
            .store
            .checkpoint(state.run_id, &snapshot, state.stage)
            .await?;
        debug!(stage = %state.stage, written, "Checkpoint persisted");
        Ok(())
    }

    async fn complete_run(&self, state: PipelineState) -> PipelineState {
        let result = match state.summary.as_ref().map(finalize::result_snapshot) {
            Some(Ok(result)) => result,
            Some(Err(e)) => return self.fail_run(state, e).await,
            None => {
                let e = ConductorError::State("finalize produced no summary".to_string());
                return self.fail_run(state, e).await;
            }
        };

        // The in-memory stage only flips once the store accepted the write
        let mut terminal = state.clone();
        if let Err(e) = terminal.advance(Stage::Completed) {
            return self.fail_run(state, e).await;
        }

        match self.store.complete(state.run_id, &result).await {
            Ok(true) => {
                info!(
                    content_pieces = terminal.drafts_produced(),
                    topics = terminal.topic_count,
                    "Run completed"
                );
                terminal
            }
            Ok(false) => {
                warn!("Run was already terminal in the store");
                self.adopt_recorded_outcome(state).await
            }
            Err(e) => {
                error!(error = %e, "Could not record run completion");
                self.fail_run(state, e.into()).await
            }
        }
    }

    async fn fail_run(&self, mut state: PipelineState, err: ConductorError) -> PipelineState {
        let message = state.error.get_or_insert_with(|| err.to_string()).clone();
        if let Err(e) = state.advance(Stage::Failed) {
            error!(error = %e, "Run could not be moved to failed");
        }

        match self.store.fail(state.run_id, &message).await {
            Ok(true) => info!(kind = err.kind(), error = %message, "Run failed"),
            Ok(false) => {
                warn!("Run was already terminal in the store");
                return self.adopt_recorded_outcome(state).await;
            }
            Err(e) => error!(error = %e, "Could not record run failure"),
        }
        state
    }

    /// Another execution finished the run first; report what its record
    /// says instead of this execution's outcome.
    async fn adopt_recorded_outcome(&self, mut state: PipelineState) -> PipelineState {
        let run = match self.store.get(state.run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                let message = "run record disappeared after a terminal write".to_string();
                return refused(state, message);
            }
            Err(e) => {
                error!(error = %e, "Could not read the recorded outcome");
                return refused(state, format!("could not read the recorded outcome: {}", e));
            }
        };

        match run.status {
            RunStatus::Completed => {
                state.stage = Stage::Completed;
                state.error = None;
                let summary = run
                    .result
                    .map(|r| serde_json::from_value::<RunSummary>(Value::Object(r)));
                match summary {
                    Some(Ok(summary)) => {
                        state.topic_count = summary.topics_found;
                        state.summary = Some(summary);
                    }
                    Some(Err(e)) => warn!(error = %e, "Recorded result is not a run summary"),
                    None => warn!("Completed run has no recorded result"),
                }
            }
            RunStatus::Failed => {
                state.stage = Stage::Failed;
                state.error = Some(
                    run.error
                        .unwrap_or_else(|| "run failed without an error message".to_string()),
                );
            }
            RunStatus::Running => {
                let message = "store refused a terminal write for a running run".to_string();
                return refused(state, message);
            }
        }
        info!(status = %run.status, "Adopted the outcome recorded by another execution");
        state
    }
}

/// Recorded outcome unknown: report the run as failed, keeping an earlier
/// failure message over `message`
fn refused(mut state: PipelineState, message: String) -> PipelineState {
    error!(error = %message, "Run outcome could not be confirmed");
    state.stage = Stage::Failed;
    state.error.get_or_insert(message);
    state
}
