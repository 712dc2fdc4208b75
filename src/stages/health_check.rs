//! Health check: confirm the practice exists and is eligible for content,
//! and classify how recently it published.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::adapters::PracticeDirectory;
use crate::core::PipelineSettings;
use crate::domain::{Freshness, HealthReport, PipelineState};
use crate::error::ConductorError;

pub struct HealthCheck {
    directory: Arc<dyn PracticeDirectory>,
    stale_after_days: i64,
    dormant_after_days: i64,
}

impl HealthCheck {
    pub fn new(directory: Arc<dyn PracticeDirectory>, settings: &PipelineSettings) -> Self {
        Self {
            directory,
            stale_after_days: settings.stale_after_days,
            dormant_after_days: settings.dormant_after_days,
        }
    }

    #[instrument(skip_all, fields(practice_id = %state.practice_id))]
    pub async fn run(&self, state: &PipelineState) -> Result<HealthReport, ConductorError> {
        let practice_id = &state.practice_id;
        let practice = self
            .directory
            .get_practice(practice_id)
            .await
            .map_err(|e| {
                ConductorError::provider(format!("practice lookup for {}", practice_id), e)
            })?
            .ok_or_else(|| {
                ConductorError::Provider(format!("practice {} not found", practice_id))
            })?;

        let has_domain = practice
            .domain
            .as_deref()
            .map_or(false, |d| !d.trim().is_empty());
        if !has_domain {
            return Err(ConductorError::Provider(format!(
                "practice {} has no website domain",
                practice_id
            )));
        }

        let checked_at = Utc::now();
        let days_since_last_publish = practice
            .last_published_at
            .map(|at| (checked_at - at).num_days().max(0));
        let freshness = self.classify(days_since_last_publish);

        info!(
            name = %practice.name,
            days_since_last_publish,
            ?freshness,
            "Practice is eligible"
        );

        Ok(HealthReport {
            practice,
            days_since_last_publish,
            freshness,
            checked_at,
        })
    }

    /// Never-published practices count as dormant
    pub fn classify(&self, days_since_last_publish: Option<i64>) -> Freshness {
        match days_since_last_publish {
            Some(days) if days <= self.stale_after_days => Freshness::Fresh,
            Some(days) if days <= self.dormant_after_days => Freshness::Stale,
            _ => Freshness::Dormant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PracticeProfile;
    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    struct OneDirectory(Option<PracticeProfile>);

    #[async_trait]
    impl PracticeDirectory for OneDirectory {
        async fn get_practice(
            &self,
            _practice_id: &str,
        ) -> anyhow::Result<Option<PracticeProfile>> {
            Ok(self.0.clone())
        }
    }

    fn practice(domain: Option<&str>, days_ago: Option<i64>) -> PracticeProfile {
        PracticeProfile {
            id: "p-1".to_string(),
            organization_id: "org-1".to_string(),
            name: "Bright Smiles".to_string(),
            domain: domain.map(str::to_string),
            vertical: "dental".to_string(),
            location: Some("Austin, TX".to_string()),
            last_published_at: days_ago.map(|d| Utc::now() - Duration::days(d)),
        }
    }

    fn handler(profile: Option<PracticeProfile>) -> HealthCheck {
        HealthCheck::new(Arc::new(OneDirectory(profile)), &PipelineSettings::default())
    }

    fn state() -> PipelineState {
        PipelineState::new(Uuid::new_v4(), "p-1".to_string(), "org-1".to_string())
    }

    #[tokio::test]
    async fn test_eligible_practice() {
        let report = handler(Some(practice(Some("brightsmiles.example"), Some(45))))
            .run(&state())
            .await
            .unwrap();

        assert_eq!(report.days_since_last_publish, Some(45));
        assert_eq!(report.freshness, Freshness::Stale);
        assert_eq!(report.practice.name, "Bright Smiles");
    }

    #[tokio::test]
    async fn test_missing_domain_is_rejected() {
        for domain in [None, Some("  ")] {
            let err = handler(Some(practice(domain, Some(3))))
                .run(&state())
                .await
                .unwrap_err();
            assert!(
                matches!(err, ConductorError::Provider(ref m) if m.contains("no website domain"))
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_practice_is_rejected() {
        let err = handler(None).run(&state()).await.unwrap_err();
        assert!(matches!(err, ConductorError::Provider(ref m) if m.contains("not found")));
    }

    #[test]
    fn test_freshness_thresholds() {
        let check = handler(None);
        assert_eq!(check.classify(Some(0)), Freshness::Fresh);
        assert_eq!(check.classify(Some(30)), Freshness::Fresh);
        assert_eq!(check.classify(Some(31)), Freshness::Stale);
        assert_eq!(check.classify(Some(90)), Freshness::Stale);
        assert_eq!(check.classify(Some(91)), Freshness::Dormant);
        assert_eq!(check.classify(None), Freshness::Dormant);
    }
}
