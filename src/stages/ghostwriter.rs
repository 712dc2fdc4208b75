//! Ghostwriter: draft content for every topic with bounded concurrency.
//!
//! One topic's failure or timeout is recorded against that topic and never
//! aborts its siblings. The stage itself only fails when its inputs are
//! missing.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::adapters::ContentDrafter;
use crate::core::PipelineSettings;
use crate::domain::{DraftResult, PipelineState, PracticeProfile, Topic};
use crate::error::ConductorError;

pub struct Ghostwriter {
    drafter: Arc<dyn ContentDrafter>,
    concurrency: usize,
    timeout: Duration,
}

impl Ghostwriter {
    pub fn new(drafter: Arc<dyn ContentDrafter>, settings: &PipelineSettings) -> Self {
        Self {
            drafter,
            concurrency: settings.ghostwriter_concurrency.max(1),
            timeout: settings.draft_timeout(),
        }
    }

    /// Results come back in topic order regardless of completion order
    #[instrument(skip_all, fields(practice_id = %state.practice_id))]
    pub async fn run(&self, state: &PipelineState) -> Result<Vec<DraftResult>, ConductorError> {
        let topics = state.topics.as_ref().ok_or_else(|| {
            ConductorError::State("ghostwriter stage reached without scholar topics".to_string())
        })?;
        let practice = &state
            .health
            .as_ref()
            .ok_or_else(|| {
                ConductorError::State(
                    "ghostwriter stage reached without a health report".to_string(),
                )
            })?
            .practice;

        let mut collector = DraftCollector::new(topics.len());
        let pending: Vec<_> = topics
            .iter()
            .enumerate()
            .map(|(index, topic)| self.draft_one(index, topic, practice))
            .collect();
        let mut attempts = stream::iter(pending).buffer_unordered(self.concurrency);

        while let Some(result) = attempts.next().await {
            collector.record(result)?;
        }

        let results = collector.into_results();
        let produced = results.iter().filter(|r| r.success).count();
        info!(
            topics = topics.len(),
            produced,
            failed = results.len() - produced,
            "Drafting finished"
        );
        Ok(results)
    }

    async fn draft_one(
        &self,
        index: usize,
        topic: &Topic,
        practice: &PracticeProfile,
    ) -> DraftResult {
        match tokio::time::timeout(self.timeout, self.drafter.draft(topic, practice)).await {
            Ok(Ok(content)) if content.content_id.trim().is_empty() => {
                warn!(index, keyword = %topic.target_keyword, "Drafter returned no content id");
                DraftResult::failed(
                    index,
                    topic,
                    "drafting provider returned an empty content id".to_string(),
                )
            }
            Ok(Ok(content)) => {
                debug!(index, content_id = %content.content_id, "Draft produced");
                DraftResult::succeeded(index, topic, content.content_id)
            }
            Ok(Err(e)) => {
                warn!(index, keyword = %topic.target_keyword, error = %e, "Draft failed");
                DraftResult::failed(index, topic, format!("{:#}", e))
            }
            Err(_) => {
                warn!(index, keyword = %topic.target_keyword, "Draft timed out");
                DraftResult::failed(
                    index,
                    topic,
                    format!("drafting timed out after {}s", self.timeout.as_secs()),
                )
            }
        }
    }
}

/// Gathers per-topic outcomes that finish in any order.
///
/// Each result lands in the slot for its topic index, so concurrent
/// completions cannot drop or reorder entries.
#[derive(Debug)]
pub struct DraftCollector {
    slots: Vec<Option<DraftResult>>,
}

impl DraftCollector {
    pub fn new(topic_count: usize) -> Self {
        Self {
            slots: vec![None; topic_count],
        }
    }

    pub fn record(&mut self, result: DraftResult) -> Result<(), ConductorError> {
        let index = result.topic_index;
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            ConductorError::State(format!("draft result for unknown topic index {}", index))
        })?;
        if slot.is_some() {
            return Err(ConductorError::State(format!(
                "topic {} was drafted twice",
                index
            )));
        }
        *slot = Some(result);
        Ok(())
    }

    /// Recorded outcomes in topic order
    pub fn into_results(self) -> Vec<DraftResult> {
        self.slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(keyword: &str) -> Topic {
        Topic {
            title: keyword.to_string(),
            target_keyword: keyword.to_string(),
            supporting_keywords: Vec::new(),
            priority: 1.0,
        }
    }

    #[test]
    fn test_collector_orders_by_topic_index() {
        let mut collector = DraftCollector::new(3);
        collector
            .record(DraftResult::succeeded(2, &topic("c"), "id-c".to_string()))
            .unwrap();
        collector
            .record(DraftResult::failed(0, &topic("a"), "boom".to_string()))
            .unwrap();
        collector
            .record(DraftResult::succeeded(1, &topic("b"), "id-b".to_string()))
            .unwrap();

        let keywords: Vec<String> = collector
            .into_results()
            .into_iter()
            .map(|r| r.target_keyword)
            .collect();
        assert_eq!(keywords, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_collector_rejects_duplicates_and_strays() {
        let mut collector = DraftCollector::new(1);
        collector
            .record(DraftResult::succeeded(0, &topic("a"), "id".to_string()))
            .unwrap();

        assert!(collector
            .record(DraftResult::succeeded(0, &topic("a"), "id".to_string()))
            .is_err());
        assert!(collector
            .record(DraftResult::succeeded(5, &topic("z"), "id".to_string()))
            .is_err());
        assert_eq!(collector.into_results().len(), 1);
    }
}
