//! Change Source Client: Google Drive v3 over reqwest.
//!
//! A `DriveClient` is scoped to one sync pass: `connect` exchanges the
//! subscription's credential for a short-lived access token and the client
//! (token included) is dropped when the pass ends.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Google;
use crate::model::{ChangeRecord, FolderNode};

pub mod auth;
pub mod model;

pub use auth::Credential;

use model::{ChangeItem, ChangeListResp, FileMetaResp, StartPageTokenResp, WatchResp};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";

/// Identifiers of a registered notification channel, kept for the eventual
/// `channels.stop` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub expiration: Option<String>,
}

/// The seam the orchestrator and resolver talk to; implemented by
/// `DriveClient` and by recording mocks in tests.
#[async_trait]
pub trait DriveService: Send + Sync {
    /// Cursor marking "now" in the drive's change log.
    async fn get_start_page_token(&self) -> Result<String>;

    /// One page of changes since `cursor`, plus the cursor to resume from.
    async fn changes_since(&self, cursor: &str) -> Result<(Vec<ChangeRecord>, String)>;

    /// Minimal metadata for the ancestry walk.
    async fn get_folder(&self, folder_id: &str) -> Result<FolderNode>;

    /// Register a webhook channel delivering pings to `address`.
    async fn register_watch(&self, cursor: &str, address: &str) -> Result<WatchChannel>;

    /// Stop a previously registered channel.
    async fn deregister_watch(&self, channel_id: &str, resource_id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
    drive_id: String,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url)
            .field("drive_id", &self.drive_id)
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    /// Acquire a pass-scoped client: one access token, valid for the
    /// duration of this pass only.
    pub async fn connect(cfg: &Google, credential: &Credential) -> Result<Self> {
        let http = Client::builder()
            .user_agent("drive-relay/0.1")
            .build()
            .context("reqwest client")?;
        let token = credential.access_token(&http, cfg).await?;
        let base_url = Url::parse(DRIVE_API_BASE).expect("valid default Drive URL");
        Ok(Self {
            http,
            base_url,
            token,
            drive_id: cfg.drive_id.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    async fn read_error(res: reqwest::Response, what: &str) -> anyhow::Error {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        anyhow!("drive {} error {}: {}", what, status, body)
    }
}

#[async_trait]
impl DriveService for DriveClient {
    async fn get_start_page_token(&self) -> Result<String> {
        let url = self.base_url.join("changes/startPageToken")?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[
                ("driveId", self.drive_id.as_str()),
                ("supportsAllDrives", "true"),
            ])
            .send()
            .await
            .context("failed to reach Drive")?;
        if !res.status().is_success() {
            return Err(Self::read_error(res, "startPageToken").await);
        }
        let payload: StartPageTokenResp = res.json().await.context("invalid Drive response JSON")?;
        Ok(payload.start_page_token)
    }

    async fn changes_since(&self, cursor: &str) -> Result<(Vec<ChangeRecord>, String)> {
        let url = self.base_url.join("changes")?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[
                ("pageToken", cursor),
                ("driveId", self.drive_id.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                (
                    "fields",
                    "nextPageToken, newStartPageToken, changes(kind, type, removed, \
                     file(parents, id, name, mimeType, trashed, webViewLink))",
                ),
            ])
            .send()
            .await
            .context("failed to reach Drive")?;
        if !res.status().is_success() {
            return Err(Self::read_error(res, "changes.list").await);
        }
        let payload: ChangeListResp = res.json().await.context("invalid Drive response JSON")?;

        // A full page carries nextPageToken, the final page carries
        // newStartPageToken; either way the returned cursor resumes where
        // this page ended. An absent token means no forward progress.
        let new_cursor = payload
            .new_start_page_token
            .or(payload.next_page_token)
            .unwrap_or_else(|| cursor.to_string());
        let records = payload
            .changes
            .into_iter()
            .filter_map(ChangeItem::into_record)
            .collect();
        Ok((records, new_cursor))
    }

    async fn get_folder(&self, folder_id: &str) -> Result<FolderNode> {
        let url = self.base_url.join(&format!("files/{}", folder_id))?;
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[
                ("fields", "id, name, parents"),
                ("supportsAllDrives", "true"),
            ])
            .send()
            .await
            .context("failed to reach Drive")?;
        if !res.status().is_success() {
            return Err(Self::read_error(res, "files.get").await);
        }
        let payload: FileMetaResp = res.json().await.context("invalid Drive response JSON")?;
        Ok(payload.into())
    }

    async fn register_watch(&self, cursor: &str, address: &str) -> Result<WatchChannel> {
        let channel_id = Uuid::new_v4().to_string();
        let url = self.base_url.join("changes/watch")?;
        debug!(%channel_id, address, "registering watch channel");
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[
                ("pageToken", cursor),
                ("driveId", self.drive_id.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
            ])
            .json(&json!({
                "id": channel_id,
                "type": "web_hook",
                "address": address,
            }))
            .send()
            .await
            .context("failed to reach Drive")?;
        if !res.status().is_success() {
            return Err(Self::read_error(res, "changes.watch").await);
        }
        let payload: WatchResp = res.json().await.context("invalid Drive response JSON")?;
        info!(channel_id = %payload.id, resource_id = %payload.resource_id,
              expiration = ?payload.expiration, "watch channel registered");
        Ok(WatchChannel {
            channel_id: payload.id,
            resource_id: payload.resource_id,
            expiration: payload.expiration,
        })
    }

    async fn deregister_watch(&self, channel_id: &str, resource_id: &str) -> Result<()> {
        let url = self.base_url.join("channels/stop")?;
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({
                "id": channel_id,
                "resourceId": resource_id,
            }))
            .send()
            .await
            .context("failed to reach Drive")?;
        if !res.status().is_success() {
            return Err(Self::read_error(res, "channels.stop").await);
        }
        info!(channel_id, resource_id, "watch channel stopped");
        Ok(())
    }
}
