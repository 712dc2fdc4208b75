//! Read-only practice profile, as returned by the practice directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile attributes consumed by the health check and research stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeProfile {
    pub id: String,
    pub organization_id: String,
    pub name: String,

    /// Website domain, e.g. `brightsmiles.example`
    #[serde(default)]
    pub domain: Option<String>,

    /// Line of business, e.g. `dental`
    pub vertical: String,

    /// City/region used to localize research
    #[serde(default)]
    pub location: Option<String>,

    /// When the practice last published content
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,
}
