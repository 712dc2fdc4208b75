//! Adapter interfaces for external collaborators.
//!
//! The pipeline talks to the outside world only through these traits:
//! a practice directory, a keyword research provider, a content drafting
//! provider and a notification sink. Concrete clients are passed into the
//! engine at construction time so tests can substitute deterministic fakes.

pub mod http;
pub mod retry;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ConductorResult;
use crate::domain::{PracticeProfile, Topic};

pub use http::{HttpContentDrafter, HttpKeywordResearch, HttpPracticeDirectory, JsonEndpoint};
pub use retry::RetryPolicy;
pub use webhook::WebhookNotifier;

/// Query sent to the research provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub practice_id: String,
    pub domain: String,
    pub vertical: String,
    pub location: Option<String>,

    /// Upper bound on candidates wanted
    pub limit: usize,
}

/// One keyword idea returned by the research provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCandidate {
    pub keyword: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub related_keywords: Vec<String>,

    /// Estimated monthly searches
    #[serde(default)]
    pub search_volume: u32,

    /// Ranking difficulty, 0 (easy) to 100 (hard)
    #[serde(default)]
    pub difficulty: u8,
}

/// Content produced by the drafting provider for one topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftedContent {
    pub content_id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub word_count: Option<u32>,
}

/// Read-only lookup of practice profiles
#[async_trait]
pub trait PracticeDirectory: Send + Sync {
    /// `Ok(None)` when the practice does not exist
    async fn get_practice(&self, practice_id: &str) -> Result<Option<PracticeProfile>>;
}

/// Keyword/topic discovery
#[async_trait]
pub trait KeywordResearch: Send + Sync {
    async fn discover(&self, query: &ResearchQuery) -> Result<Vec<KeywordCandidate>>;
}

/// Content drafting, invoked once per topic
#[async_trait]
pub trait ContentDrafter: Send + Sync {
    async fn draft(&self, topic: &Topic, practice: &PracticeProfile) -> Result<DraftedContent>;
}

/// Sink told about every finished run
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, result: &ConductorResult) -> Result<()>;
}
