//! Deterministic collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use conductor::adapters::{
    ContentDrafter, DraftedContent, KeywordCandidate, KeywordResearch, Notifier,
    PracticeDirectory, ResearchQuery,
};
use conductor::domain::{Checkpoint, NewRun, PracticeProfile, Run, Snapshot, Stage, Topic};
use conductor::stages::Providers;
use conductor::store::{MemoryRunStore, RunStore, StoreError};
use conductor::{Conductor, ConductorResult, PipelineSettings};

pub const PRACTICE_ID: &str = "practice-1";
pub const ORGANIZATION_ID: &str = "org-1";

pub fn practice() -> PracticeProfile {
    PracticeProfile {
        id: PRACTICE_ID.to_string(),
        organization_id: ORGANIZATION_ID.to_string(),
        name: "Bright Smiles Dental".to_string(),
        domain: Some("brightsmiles.example".to_string()),
        vertical: "dental".to_string(),
        location: Some("Austin, TX".to_string()),
        last_published_at: Some(Utc::now() - chrono::Duration::days(12)),
    }
}

pub fn candidate(keyword: &str, search_volume: u32) -> KeywordCandidate {
    KeywordCandidate {
        keyword: keyword.to_string(),
        title: None,
        related_keywords: Vec::new(),
        search_volume,
        difficulty: 0,
    }
}

/// Candidates whose priorities descend in the order given
pub fn ranked_candidates(keywords: &[&str]) -> Vec<KeywordCandidate> {
    keywords
        .iter()
        .enumerate()
        .map(|(i, k)| candidate(k, 1000 - i as u32 * 10))
        .collect()
}

// ============================================================================
// Practice directory
// ============================================================================

#[derive(Default)]
pub struct FakeDirectory {
    practices: HashMap<String, PracticeProfile>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with(practice: PracticeProfile) -> Self {
        let mut practices = HashMap::new();
        practices.insert(practice.id.clone(), practice);
        Self {
            practices,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PracticeDirectory for FakeDirectory {
    async fn get_practice(&self, practice_id: &str) -> anyhow::Result<Option<PracticeProfile>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            anyhow::bail!("{}", message);
        }
        Ok(self.practices.get(practice_id).cloned())
    }
}

// ============================================================================
// Keyword research
// ============================================================================

#[derive(Default)]
pub struct FakeResearch {
    candidates: Vec<KeywordCandidate>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl FakeResearch {
    pub fn returning(candidates: Vec<KeywordCandidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordResearch for FakeResearch {
    async fn discover(&self, _query: &ResearchQuery) -> anyhow::Result<Vec<KeywordCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            anyhow::bail!("{}", message);
        }
        Ok(self.candidates.clone())
    }
}

// ============================================================================
// Content drafting
// ============================================================================

/// Drafter that fails, stalls or delays chosen keywords and tracks how
/// many drafts run at once
#[derive(Default)]
pub struct FakeDrafter {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }

    pub fn hang_on(mut self, keyword: &str) -> Self {
        self.hanging.insert(keyword.to_string());
        self
    }

    pub fn delay(mut self, keyword: &str, delay: Duration) -> Self {
        self.delays.insert(keyword.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn content_id(keyword: &str) -> String {
    format!("post-{}", keyword.replace(' ', "-"))
}

#[async_trait]
impl ContentDrafter for FakeDrafter {
    async fn draft(
        &self,
        topic: &Topic,
        _practice: &PracticeProfile,
    ) -> anyhow::Result<DraftedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let keyword = topic.target_keyword.as_str();
        let delay = if self.hanging.contains(keyword) {
            Duration::from_secs(30)
        } else {
            self.delays
                .get(keyword)
                .copied()
                .unwrap_or(Duration::from_millis(5))
        };
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(keyword) {
            anyhow::bail!("drafting quota exceeded for '{}'", keyword);
        }
        Ok(DraftedContent {
            content_id: content_id(keyword),
            title: Some(topic.title.clone()),
            word_count: Some(1200),
        })
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    results: Mutex<Vec<ConductorResult>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn results(&self) -> Vec<ConductorResult> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, result: &ConductorResult) -> anyhow::Result<()> {
        self.results.lock().unwrap().push(result.clone());
        if self.fail {
            anyhow::bail!("webhook returned 503");
        }
        Ok(())
    }
}

// ============================================================================
// Run store with injected faults
// ============================================================================

fn unavailable() -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "database unavailable",
    ))
}

/// Memory store that can reject chosen writes
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryRunStore,
    fail_create: bool,
    reject_checkpoint_at: Option<Stage>,
    outage_from: Option<Stage>,
    down: AtomicBool,
    terminal_writes_fail: AtomicBool,
    failed_elsewhere: Option<String>,
    completed_elsewhere: Option<Snapshot>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create` always fails
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Only the checkpoint at `stage` fails
    pub fn rejecting_checkpoint_at(mut self, stage: Stage) -> Self {
        self.reject_checkpoint_at = Some(stage);
        self
    }

    /// From the checkpoint at `stage` on, every write fails until `restore`
    pub fn outage_from(mut self, stage: Stage) -> Self {
        self.outage_from = Some(stage);
        self
    }

    /// `complete` and `fail` fail until `restore`
    pub fn failing_terminal_writes(self) -> Self {
        self.terminal_writes_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Another execution records `error` just before `complete` lands
    pub fn failed_elsewhere(mut self, error: &str) -> Self {
        self.failed_elsewhere = Some(error.to_string());
        self
    }

    /// Another execution records `result` just before `fail` lands
    pub fn completed_elsewhere(mut self, result: Snapshot) -> Self {
        self.completed_elsewhere = Some(result);
        self
    }

    pub fn restore(&self) {
        self.down.store(false, Ordering::SeqCst);
        self.terminal_writes_fail.store(false, Ordering::SeqCst);
    }

    fn writes_blocked(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    fn terminal_writes_blocked(&self) -> bool {
        self.writes_blocked() || self.terminal_writes_fail.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn create(&self, new_run: NewRun) -> Result<Run, StoreError> {
        if self.fail_create {
            return Err(unavailable());
        }
        self.inner.create(new_run).await
    }

    async fn checkpoint(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        stage: Stage,
    ) -> Result<bool, StoreError> {
        if self.outage_from == Some(stage) {
            self.down.store(true, Ordering::SeqCst);
        }
        if self.writes_blocked() || self.reject_checkpoint_at == Some(stage) {
            return Err(unavailable());
        }
        self.inner.checkpoint(run_id, snapshot, stage).await
    }

    async fn complete(&self, run_id: Uuid, result: &Snapshot) -> Result<bool, StoreError> {
        if self.terminal_writes_blocked() {
            return Err(unavailable());
        }
        if let Some(error) = &self.failed_elsewhere {
            self.inner.fail(run_id, error).await?;
        }
        self.inner.complete(run_id, result).await
    }

    async fn fail(&self, run_id: Uuid, error: &str) -> Result<bool, StoreError> {
        if self.terminal_writes_blocked() {
            return Err(unavailable());
        }
        if let Some(result) = &self.completed_elsewhere {
            self.inner.complete(run_id, result).await?;
        }
        self.inner.fail(run_id, error).await
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<Run>, StoreError> {
        self.inner.get(run_id).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        self.inner.list_recent(limit).await
    }

    async fn checkpoints(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, StoreError> {
        self.inner.checkpoints(run_id).await
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub research: Arc<FakeResearch>,
    pub drafter: Arc<FakeDrafter>,
}

impl Harness {
    pub fn new(directory: FakeDirectory, research: FakeResearch, drafter: FakeDrafter) -> Self {
        Self {
            directory: Arc::new(directory),
            research: Arc::new(research),
            drafter: Arc::new(drafter),
        }
    }

    /// A healthy practice with the given keywords
    pub fn with_keywords(keywords: &[&str], drafter: FakeDrafter) -> Self {
        Self::new(
            FakeDirectory::with(practice()),
            FakeResearch::returning(ranked_candidates(keywords)),
            drafter,
        )
    }

    pub fn providers(&self) -> Providers {
        Providers {
            directory: self.directory.clone(),
            research: self.research.clone(),
            drafter: self.drafter.clone(),
        }
    }

    pub fn conductor(&self, store: Arc<dyn RunStore>) -> Conductor {
        self.conductor_with(store, PipelineSettings::default())
    }

    pub fn conductor_with(
        &self,
        store: Arc<dyn RunStore>,
        settings: PipelineSettings,
    ) -> Conductor {
        Conductor::new(store, self.providers(), settings).unwrap()
    }
}

/// Stage markers of a run's checkpoint history, oldest first
pub async fn checkpoint_stages(store: &dyn RunStore, run_id: Uuid) -> Vec<Stage> {
    store
        .checkpoints(run_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.stage)
        .collect()
}
