//! Resume Integration Tests
//!
//! Runs interrupted by a store outage continue from their last checkpoint
//! without repeating finished stages.

mod common;

use std::sync::Arc;

use common::*;
use conductor::domain::{NewRun, RunStatus, Stage, Trigger};
use conductor::store::{MemoryRunStore, RunStore, StoreError};
use conductor::{ConductorError, PipelineSettings};
use uuid::Uuid;

#[tokio::test]
async fn test_resume_skips_finished_stages() {
    let harness = Harness::with_keywords(&["implants", "whitening"], FakeDrafter::new());
    let store = Arc::new(FlakyStore::new().outage_from(Stage::Scholar));
    let conductor = harness.conductor(store.clone());

    // The outage hits after the scholar stage ran; the record stays open
    let interrupted = conductor.run(PRACTICE_ID, ORGANIZATION_ID).await.unwrap();
    assert_eq!(interrupted.status, RunStatus::Failed);
    let run = store.get(interrupted.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.stage, Stage::HealthCheck);
    assert_eq!(harness.directory.calls(), 1);
    assert_eq!(harness.research.calls(), 1);

    store.restore();
    let resumed = conductor.resume(interrupted.run_id).await.unwrap();

    assert_eq!(resumed.run_id, interrupted.run_id);
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.content_pieces_generated, 2);
    assert_eq!(resumed.scholar_keywords, 2);
    assert_eq!(harness.directory.calls(), 1, "health check must not rerun");
    assert_eq!(harness.research.calls(), 2);
    assert_eq!(harness.drafter.calls(), 2);

    let run = store.get(interrupted.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stage, Stage::Completed);
    assert_eq!(
        checkpoint_stages(store.as_ref(), run.id).await,
        vec![
            Stage::Init,
            Stage::HealthCheck,
            Stage::Scholar,
            Stage::Ghostwriter,
            Stage::Finalize
        ]
    );
}

#[tokio::test]
async fn test_resume_after_lost_completion() {
    let harness = Harness::with_keywords(&["implants"], FakeDrafter::new());
    let store = Arc::new(FlakyStore::new().failing_terminal_writes());
    let conductor = harness.conductor(store.clone());

    let interrupted = conductor.run(PRACTICE_ID, ORGANIZATION_ID).await.unwrap();
    assert_eq!(interrupted.status, RunStatus::Failed);

    store.restore();
    let resumed = conductor.resume(interrupted.run_id).await.unwrap();

    assert!(resumed.is_completed());
    assert_eq!(resumed.content_pieces_generated, 1);
    // Everything up to finalize was checkpointed; nothing reruns
    assert_eq!(harness.research.calls(), 1);
    assert_eq!(harness.drafter.calls(), 1);

    let run = store.get(interrupted.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.unwrap()["drafts_produced"], 1);
}

#[tokio::test]
async fn test_resume_finishes_a_recorded_failure() {
    let harness = Harness::new(
        FakeDirectory::with(practice()),
        FakeResearch::failing("research quota exhausted"),
        FakeDrafter::new(),
    );
    let store = Arc::new(FlakyStore::new().failing_terminal_writes());
    let conductor = harness.conductor(store.clone());

    let interrupted = conductor.run(PRACTICE_ID, ORGANIZATION_ID).await.unwrap();
    let error = interrupted.error.clone().unwrap();
    assert!(error.contains("research quota exhausted"));

    store.restore();
    let resumed = conductor.resume(interrupted.run_id).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Failed);
    assert_eq!(resumed.error.as_deref(), Some(error.as_str()));
    assert_eq!(harness.research.calls(), 1, "failed stage must not rerun");

    let run = store.get(interrupted.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.stage, Stage::Scholar);
    assert_eq!(run.error.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn test_resume_without_checkpoint_starts_over() {
    let harness = Harness::with_keywords(&["implants"], FakeDrafter::new());
    let store = Arc::new(MemoryRunStore::new());
    let settings = PipelineSettings::default();
    let run = store
        .create(NewRun {
            organization_id: ORGANIZATION_ID.to_string(),
            practice_id: PRACTICE_ID.to_string(),
            graph_version: settings.graph_version.clone(),
            trigger: Trigger::Scheduled,
            config: settings.to_snapshot(),
        })
        .await
        .unwrap();

    let result = harness
        .conductor_with(store.clone(), settings)
        .resume(run.id)
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(harness.directory.calls(), 1);
    assert_eq!(checkpoint_stages(store.as_ref(), run.id).await.len(), 5);
}

#[tokio::test]
async fn test_resume_rejects_finished_runs() {
    let harness = Harness::with_keywords(&["implants"], FakeDrafter::new());
    let store = Arc::new(MemoryRunStore::new());
    let conductor = harness.conductor(store.clone());

    let finished = conductor.run(PRACTICE_ID, ORGANIZATION_ID).await.unwrap();
    assert!(finished.is_completed());

    let err = conductor.resume(finished.run_id).await.unwrap_err();
    assert!(matches!(err, ConductorError::State(ref m) if m.contains("already completed")));
    assert_eq!(harness.directory.calls(), 1);
}

#[tokio::test]
async fn test_resume_unknown_run() {
    let harness = Harness::with_keywords(&["implants"], FakeDrafter::new());
    let conductor = harness.conductor(Arc::new(MemoryRunStore::new()));

    let err = conductor.resume(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Persistence(StoreError::NotFound(_))
    ));
}
