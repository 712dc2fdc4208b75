//! Scholar: turn keyword research into a ranked, bounded topic list.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::adapters::{KeywordCandidate, KeywordResearch, ResearchQuery};
use crate::core::PipelineSettings;
use crate::domain::{PipelineState, Topic};
use crate::error::ConductorError;

pub struct Scholar {
    research: Arc<dyn KeywordResearch>,
    max_topics: usize,
}

impl Scholar {
    pub fn new(research: Arc<dyn KeywordResearch>, settings: &PipelineSettings) -> Self {
        Self {
            research,
            max_topics: settings.max_topics,
        }
    }

    /// An empty list is a valid outcome: nothing new to write about
    #[instrument(skip_all, fields(practice_id = %state.practice_id))]
    pub async fn run(&self, state: &PipelineState) -> Result<Vec<Topic>, ConductorError> {
        let health = state.health.as_ref().ok_or_else(|| {
            ConductorError::State("scholar stage reached without a health report".to_string())
        })?;
        let practice = &health.practice;
        let domain = practice.domain.clone().ok_or_else(|| {
            ConductorError::State(format!("practice {} has no domain to research", practice.id))
        })?;

        let query = ResearchQuery {
            practice_id: practice.id.clone(),
            domain,
            vertical: practice.vertical.clone(),
            location: practice.location.clone(),
            // Extra headroom for duplicates and blanks
            limit: self.max_topics.saturating_mul(2),
        };

        let candidates = self.research.discover(&query).await.map_err(|e| {
            ConductorError::provider(format!("keyword research for {}", practice.id), e)
        })?;
        let received = candidates.len();
        let topics = rank_topics(candidates, self.max_topics);

        if topics.is_empty() {
            info!(received, "No new topics this cycle");
        } else {
            info!(received, kept = topics.len(), "Topics selected");
        }
        Ok(topics)
    }
}

/// Expected value of writing about a keyword
pub fn priority(candidate: &KeywordCandidate) -> f64 {
    let ease = 100u32.saturating_sub(u32::from(candidate.difficulty.min(100)));
    f64::from(candidate.search_volume) * f64::from(ease) / 100.0
}

/// Drop blank and duplicate keywords, order by priority (highest first),
/// and keep at most `max_topics`.
///
/// Duplicates compare case-insensitively; the higher-priority copy wins.
/// Ties are broken by keyword so the order is deterministic.
pub fn rank_topics(candidates: Vec<KeywordCandidate>, max_topics: usize) -> Vec<Topic> {
    let mut best: HashMap<String, Topic> = HashMap::new();

    for candidate in candidates {
        let keyword = candidate.keyword.trim();
        if keyword.is_empty() {
            debug!("Skipping blank keyword");
            continue;
        }
        let topic = to_topic(keyword, &candidate);
        let key = keyword.to_lowercase();

        match best.get(&key) {
            Some(existing) if existing.priority >= topic.priority => {}
            _ => {
                best.insert(key, topic);
            }
        }
    }

    let mut topics: Vec<Topic> = best.into_values().collect();
    topics.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.target_keyword.cmp(&b.target_keyword))
    });
    topics.truncate(max_topics);
    topics
}

fn to_topic(keyword: &str, candidate: &KeywordCandidate) -> Topic {
    let lowered = keyword.to_lowercase();
    let mut supporting: Vec<String> = Vec::new();
    for related in &candidate.related_keywords {
        let related = related.trim();
        if related.is_empty() || related.to_lowercase() == lowered {
            continue;
        }
        if !supporting.iter().any(|s| s.eq_ignore_ascii_case(related)) {
            supporting.push(related.to_string());
        }
    }

    let title = candidate
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(keyword)
        .to_string();

    Topic {
        title,
        target_keyword: keyword.to_string(),
        supporting_keywords: supporting,
        priority: priority(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(keyword: &str, volume: u32, difficulty: u8) -> KeywordCandidate {
        KeywordCandidate {
            keyword: keyword.to_string(),
            title: None,
            related_keywords: Vec::new(),
            search_volume: volume,
            difficulty,
        }
    }

    #[test]
    fn test_priority() {
        assert_eq!(priority(&candidate("a", 1000, 40)), 600.0);
        assert_eq!(priority(&candidate("a", 1000, 100)), 0.0);
        assert_eq!(priority(&candidate("a", 1000, 250)), 0.0);
    }

    #[test]
    fn test_rank_orders_and_caps() {
        let topics = rank_topics(
            vec![
                candidate("invisalign cost", 200, 50),
                candidate("dental implants", 1000, 60),
                candidate("teeth whitening", 800, 20),
            ],
            2,
        );

        let keywords: Vec<&str> = topics.iter().map(|t| t.target_keyword.as_str()).collect();
        assert_eq!(keywords, vec!["teeth whitening", "dental implants"]);
        assert_eq!(topics[0].title, "teeth whitening");
    }

    #[test]
    fn test_rank_drops_blanks_and_duplicates() {
        let mut related = candidate("Root Canal", 500, 10);
        related.related_keywords = vec![
            "root canal".to_string(),
            "root canal pain".to_string(),
            "Root Canal Pain".to_string(),
            " ".to_string(),
        ];
        related.title = Some("What a root canal involves".to_string());

        let topics = rank_topics(
            vec![
                candidate("   ", 9000, 0),
                candidate("root canal", 100, 10),
                related,
            ],
            10,
        );

        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].target_keyword, "Root Canal");
        assert_eq!(topics[0].title, "What a root canal involves");
        assert_eq!(topics[0].supporting_keywords, vec!["root canal pain".to_string()]);
    }

    #[test]
    fn test_rank_ties_are_deterministic() {
        let topics = rank_topics(
            vec![candidate("braces", 100, 0), candidate("aligners", 100, 0)],
            10,
        );
        assert_eq!(topics[0].target_keyword, "aligners");
        assert_eq!(topics[1].target_keyword, "braces");
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_topics(Vec::new(), 10).is_empty());
    }
}
