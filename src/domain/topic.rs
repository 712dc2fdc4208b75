//! Topics discovered by research and the outcome of drafting each one.

use serde::{Deserialize, Serialize};

/// A candidate content subject. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub target_keyword: String,
    pub supporting_keywords: Vec<String>,

    /// Higher is more valuable
    pub priority: f64,
}

/// Outcome of drafting one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftResult {
    /// Position of the topic in the scholar output
    pub topic_index: usize,

    pub target_keyword: String,
    pub success: bool,

    /// Identifier of the produced content, set only on success
    pub content_id: Option<String>,

    /// Error message, set only on failure
    pub error: Option<String>,
}

impl DraftResult {
    pub fn succeeded(topic_index: usize, topic: &Topic, content_id: String) -> Self {
        Self {
            topic_index,
            target_keyword: topic.target_keyword.clone(),
            success: true,
            content_id: Some(content_id),
            error: None,
        }
    }

    pub fn failed(topic_index: usize, topic: &Topic, error: String) -> Self {
        Self {
            topic_index,
            target_keyword: topic.target_keyword.clone(),
            success: false,
            content_id: None,
            error: Some(error),
        }
    }
}
