//! Ancestry Resolver: bounded folder-tree walk to find a routing match.
//!
//! The walk is hard-capped at two levels (parent, then grandparent). A
//! shallow project/category hierarchy is the supported layout; anything
//! deeper is out of scope and resolves to no destination.

use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

use crate::drive::DriveService;

/// The routing decision for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub database_id: String,
    /// The folder whose name matched; written as the page attribution.
    pub folder_name: String,
}

/// Climb from a file's primary parent looking for a folder name present in
/// the routing map. Folder names are trimmed before lookup at both levels.
pub async fn resolve_destination(
    source: &dyn DriveService,
    parent_folder_id: &str,
    routing_map: &HashMap<String, String>,
) -> Result<Option<Resolved>> {
    let parent = source.get_folder(parent_folder_id).await?;
    let parent_name = parent.name.trim();
    if let Some(database_id) = routing_map.get(parent_name) {
        return Ok(Some(Resolved {
            database_id: database_id.clone(),
            folder_name: parent_name.to_string(),
        }));
    }

    let Some(grandparent_id) = parent.parent_id() else {
        debug!(folder = %parent.name, "folder unmapped and has no parent");
        return Ok(None);
    };

    let grandparent = source.get_folder(grandparent_id).await?;
    let grandparent_name = grandparent.name.trim();
    if let Some(database_id) = routing_map.get(grandparent_name) {
        return Ok(Some(Resolved {
            database_id: database_id.clone(),
            folder_name: grandparent_name.to_string(),
        }));
    }

    debug!(folder = %parent.name, grandparent = %grandparent.name, "no routing match within two levels");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::WatchChannel;
    use crate::model::{ChangeRecord, FolderNode};
    use anyhow::anyhow;
    use async_trait::async_trait;

    /// Drive stub serving a fixed folder tree.
    struct StubDrive {
        folders: Vec<FolderNode>,
    }

    impl StubDrive {
        fn new(folders: Vec<(&str, &str, Option<&str>)>) -> Self {
            Self {
                folders: folders
                    .into_iter()
                    .map(|(id, name, parent)| FolderNode {
                        id: id.to_string(),
                        name: name.to_string(),
                        parent_ids: parent.map(str::to_string).into_iter().collect(),
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl DriveService for StubDrive {
        async fn get_start_page_token(&self) -> Result<String> {
            unimplemented!("not used by resolver")
        }

        async fn changes_since(&self, _cursor: &str) -> Result<(Vec<ChangeRecord>, String)> {
            unimplemented!("not used by resolver")
        }

        async fn get_folder(&self, folder_id: &str) -> Result<FolderNode> {
            self.folders
                .iter()
                .find(|f| f.id == folder_id)
                .cloned()
                .ok_or_else(|| anyhow!("no such folder: {}", folder_id))
        }

        async fn register_watch(&self, _cursor: &str, _address: &str) -> Result<WatchChannel> {
            unimplemented!("not used by resolver")
        }

        async fn deregister_watch(&self, _channel_id: &str, _resource_id: &str) -> Result<()> {
            unimplemented!("not used by resolver")
        }
    }

    fn routing(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn direct_parent_match() {
        let drive = StubDrive::new(vec![("p1", "Invoices", Some("root"))]);
        let map = routing(&[("Invoices", "db-1")]);

        let resolved = resolve_destination(&drive, "p1", &map).await.unwrap();
        assert_eq!(
            resolved,
            Some(Resolved {
                database_id: "db-1".into(),
                folder_name: "Invoices".into(),
            })
        );
    }

    #[tokio::test]
    async fn parent_name_is_trimmed() {
        let drive = StubDrive::new(vec![("p1", "  Invoices ", Some("root"))]);
        let map = routing(&[("Invoices", "db-1")]);

        let resolved = resolve_destination(&drive, "p1", &map).await.unwrap();
        assert_eq!(resolved.unwrap().folder_name, "Invoices");
    }

    #[tokio::test]
    async fn grandparent_match_attributes_grandparent() {
        let drive = StubDrive::new(vec![
            ("p1", "Misc", Some("p2")),
            ("p2", "Invoices", Some("root")),
        ]);
        let map = routing(&[("Invoices", "db-1")]);

        let resolved = resolve_destination(&drive, "p1", &map).await.unwrap().unwrap();
        assert_eq!(resolved.database_id, "db-1");
        assert_eq!(resolved.folder_name, "Invoices");
    }

    #[tokio::test]
    async fn walk_is_capped_at_two_levels() {
        // Only the great-grandparent is mapped; it must never be reached.
        let drive = StubDrive::new(vec![
            ("a", "A", Some("b")),
            ("b", "B", Some("c")),
            ("c", "C", Some("d")),
            ("d", "D", None),
        ]);
        let map = routing(&[("D", "db-d")]);

        let resolved = resolve_destination(&drive, "a", &map).await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn unmapped_leaf_without_grandparent() {
        let drive = StubDrive::new(vec![("p1", "Misc", None)]);
        let map = routing(&[("Invoices", "db-1")]);

        let resolved = resolve_destination(&drive, "p1", &map).await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let drive = StubDrive::new(vec![("p1", "invoices", None)]);
        let map = routing(&[("Invoices", "db-1")]);

        let resolved = resolve_destination(&drive, "p1", &map).await.unwrap();
        assert_eq!(resolved, None);
    }
}
