//! Destination Sink: Notion pages API over reqwest.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::model::FileCategory;

const NOTION_API_BASE: &str = "https://api.notion.com/";

/// Everything needed to create one page in a destination database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpsert {
    pub title: String,
    pub source_url: Option<String>,
    pub category: FileCategory,
    /// Name of the folder that routed this file, written to the `By` field.
    pub attributed_folder: String,
}

#[async_trait]
pub trait NotionSink: Send + Sync {
    /// Create one record; returns the created page id.
    async fn create_record(&self, page: &PageUpsert, database_id: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String) -> Self {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("drive-relay/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/pages")
            .context("invalid Notion base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build Notion request")
    }

    async fn execute_create(&self, body: Value) -> Result<String> {
        let request = self.build_request(&body)?;
        info!(url = %request.url(), "creating Notion page");

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Notion")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Notion: {}", body);
            return Err(anyhow!("received 429 from Notion: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Notion API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("notion error {}: {}", status, body));
        }

        let payload: CreatePageResponse = res
            .json()
            .await
            .context("invalid Notion response JSON")?;
        info!(page_id = %payload.id, "created Notion page");
        Ok(payload.id)
    }
}

#[async_trait]
impl NotionSink for NotionClient {
    async fn create_record(&self, page: &PageUpsert, database_id: &str) -> Result<String> {
        let body = build_page_request(page, database_id);
        self.execute_create(body).await
    }
}

pub fn build_page_request(page: &PageUpsert, database_id: &str) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "Title".to_string(),
        json!({
            "title": [
                {
                    "text": {
                        "content": page.title,
                    }
                }
            ]
        }),
    );

    if let Some(url) = page.source_url.as_deref().filter(|u| !u.is_empty()) {
        properties.insert("URL".to_string(), json!({ "url": url }));
    }

    properties.insert(
        "Type".to_string(),
        json!({ "select": { "name": page.category.as_str() } }),
    );
    properties.insert(
        "By".to_string(),
        json!({ "select": { "name": page.attributed_folder } }),
    );

    json!({
        "parent": { "database_id": database_id },
        "properties": Value::Object(properties),
    })
}

#[derive(Deserialize)]
struct CreatePageResponse {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> PageUpsert {
        PageUpsert {
            title: "report".into(),
            source_url: Some("https://drive.example/f1".into()),
            category: FileCategory::Document,
            attributed_folder: "Invoices".into(),
        }
    }

    #[test]
    fn build_page_request_includes_all_fields() {
        let body = build_page_request(&sample_page(), "db-1");
        assert_eq!(body["parent"]["database_id"], "db-1");
        assert_eq!(
            body["properties"]["Title"]["title"][0]["text"]["content"],
            "report"
        );
        assert_eq!(body["properties"]["URL"]["url"], "https://drive.example/f1");
        assert_eq!(body["properties"]["Type"]["select"]["name"], "Document");
        assert_eq!(body["properties"]["By"]["select"]["name"], "Invoices");
    }

    #[test]
    fn build_page_request_omits_missing_url() {
        let mut page = sample_page();
        page.source_url = None;
        let body = build_page_request(&page, "db-1");
        assert!(body["properties"].get("URL").is_none());
    }

    #[test]
    fn build_request_sets_headers() {
        let client = NotionClient::new("token".into(), "2022-06-28".into());
        let body = json!({ "sample": true });
        let request = client.build_request(&body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/pages");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers
                .get("Notion-Version")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "2022-06-28"
        );
    }
}
