use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One registered watch channel and its routing configuration.
///
/// `cursor` is the Drive page token the next sync pass starts from; it is
/// opaque and only ever advanced forward by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub cursor: String,
    pub channel_id: String,
    pub resource_id: String,
    /// Folder name → Notion database id. Keys are case-sensitive; names are
    /// trimmed before lookup.
    pub routing_map: HashMap<String, String>,
    /// Inline per-subscription credential. `None` means the shared
    /// service-account key from config is used instead.
    pub google_refresh_token: Option<String>,
    pub notion_token: String,
    pub created_at: DateTime<Utc>,
}
