//! Wire types for the Drive v3 REST API.

use serde::Deserialize;

use crate::model::{ChangeKind, ChangeRecord, FolderNode};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageTokenResp {
    pub start_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeListResp {
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    #[serde(rename = "type")]
    pub change_type: Option<String>,
    #[serde(default)]
    pub removed: bool,
    pub file: Option<FileResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub parents: Vec<String>,
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResp {
    pub id: String,
    pub resource_id: String,
    pub expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetaResp {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl ChangeItem {
    /// Flatten one wire entry into the domain record, or None for entries
    /// with no file payload (drive-level changes, removals without metadata).
    pub fn into_record(self) -> Option<ChangeRecord> {
        let file = self.file?;
        let kind = match self.change_type.as_deref() {
            Some("file") => ChangeKind::File,
            _ => ChangeKind::Other,
        };
        Some(ChangeRecord {
            file_id: file.id,
            file_name: file.name.unwrap_or_default(),
            mime_type: file.mime_type.unwrap_or_default(),
            trashed: file.trashed || self.removed,
            kind,
            parent_ids: file.parents,
            web_view_link: file.web_view_link,
        })
    }
}

impl From<FileMetaResp> for FolderNode {
    fn from(meta: FileMetaResp) -> Self {
        FolderNode {
            id: meta.id,
            name: meta.name.unwrap_or_default(),
            parent_ids: meta.parents,
        }
    }
}
