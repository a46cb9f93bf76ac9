use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical ad as persisted, one per (`page_id`, `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdRecord {
    pub id: String,
    pub page_id: String,
    pub is_active: bool,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub creative_bodies: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

/// Per-page summary, overwritten on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_id: String,
    pub last_synced: DateTime<Utc>,
    pub total_ads: usize,
}
