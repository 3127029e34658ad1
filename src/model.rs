use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Mime type Drive uses for folders; folder changes are never relayed.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// What a single change entry refers to. Drive also reports drive-level
/// changes and removals; only `File` entries can produce an upsert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeKind {
    File,
    Other,
}

/// One entry from a Drive changes page. Ephemeral: lives for one sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub trashed: bool,
    pub kind: ChangeKind,
    pub parent_ids: Vec<String>,
    pub web_view_link: Option<String>,
}

impl ChangeRecord {
    /// True when the change can produce an upsert: a live, non-folder file.
    pub fn is_relayable(&self) -> bool {
        self.kind == ChangeKind::File && !self.trashed && self.mime_type != FOLDER_MIME_TYPE
    }

    pub fn primary_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

/// Minimal folder metadata needed for the ancestry walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub parent_ids: Vec<String>,
}

impl FolderNode {
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

/// Coarse file classification written into the destination page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileCategory {
    Document,
    Image,
    Video,
    Other,
}

const DOCUMENT_MIMES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
];

impl FileCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        if DOCUMENT_MIMES.contains(&mime_type) {
            FileCategory::Document
        } else if mime_type.starts_with("image/") {
            FileCategory::Image
        } else if mime_type.starts_with("video/") {
            FileCategory::Video
        } else {
            FileCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Document => "Document",
            FileCategory::Image => "Image",
            FileCategory::Video => "Video",
            FileCategory::Other => "Other",
        }
    }
}

static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[^/.]+$").expect("valid extension regex"));

/// Strip the final dot-extension from a file name, once.
/// `"report.pdf"` → `"report"`, `"archive.tar.gz"` → `"archive.tar"`.
/// Dotfiles like `".gitignore"` are left alone rather than reduced to "".
pub fn display_name(file_name: &str) -> String {
    let stripped = EXTENSION_RE.replace(file_name, "");
    if stripped.is_empty() {
        file_name.to_string()
    } else {
        stripped.into_owned()
    }
}

/// Why a filtered-in change did not produce an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An unexpired dedup marker already exists for the file id.
    Duplicate,
    /// The change carried no parent folder id.
    NoParent,
    /// Neither parent nor grandparent folder name is in the routing map.
    Unrouted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_last_extension_only() {
        assert_eq!(display_name("report.pdf"), "report");
        assert_eq!(display_name("archive.tar.gz"), "archive.tar");
        assert_eq!(display_name("README"), "README");
        assert_eq!(display_name("a/b.txt"), "a/b");
    }

    #[test]
    fn display_name_keeps_dotfiles() {
        assert_eq!(display_name(".gitignore"), ".gitignore");
    }

    #[test]
    fn classify_mime_types() {
        assert_eq!(
            FileCategory::from_mime("application/pdf"),
            FileCategory::Document
        );
        assert_eq!(FileCategory::from_mime("text/csv"), FileCategory::Document);
        assert_eq!(FileCategory::from_mime("image/png"), FileCategory::Image);
        assert_eq!(FileCategory::from_mime("video/mp4"), FileCategory::Video);
        assert_eq!(
            FileCategory::from_mime("application/zip"),
            FileCategory::Other
        );
    }

    #[test]
    fn folder_changes_are_not_relayable() {
        let change = ChangeRecord {
            file_id: "f1".into(),
            file_name: "Projects".into(),
            mime_type: FOLDER_MIME_TYPE.into(),
            trashed: false,
            kind: ChangeKind::File,
            parent_ids: vec![],
            web_view_link: None,
        };
        assert!(!change.is_relayable());
    }
}
