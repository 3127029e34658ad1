//! Credential strategies for the Drive API.
//!
//! A subscription either carries its own OAuth refresh token or falls back
//! to the shared service-account key from config. Both strategies exchange
//! their long-lived secret for one short-lived access token, acquired at the
//! start of a pass and dropped with the client at the end of it.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Google;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// How a pass authenticates against the Drive API.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Per-subscription OAuth refresh token (paired with the configured
    /// client id/secret).
    RefreshToken(String),
    /// Shared service-account key file.
    ServiceAccount(PathBuf),
}

impl Credential {
    /// Pick the strategy for a subscription: an inline refresh token wins,
    /// otherwise the configured service-account key is used.
    pub fn select(refresh_token: Option<&str>, cfg: &Google) -> Result<Self> {
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            return Ok(Credential::RefreshToken(token.to_string()));
        }
        let key = cfg
            .service_account_key
            .as_deref()
            .ok_or_else(|| anyhow!("subscription has no refresh token and no service_account_key is configured"))?;
        Ok(Credential::ServiceAccount(PathBuf::from(key)))
    }

    /// Exchange the credential for a short-lived access token.
    pub async fn access_token(&self, http: &Client, cfg: &Google) -> Result<String> {
        match self {
            Credential::RefreshToken(refresh_token) => {
                refresh_grant(http, cfg, refresh_token).await
            }
            Credential::ServiceAccount(key_path) => jwt_grant(http, key_path).await,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn refresh_grant(http: &Client, cfg: &Google, refresh_token: &str) -> Result<String> {
    let params = [
        ("client_id", cfg.client_id.as_str()),
        ("client_secret", cfg.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    let res = http
        .post(TOKEN_ENDPOINT)
        .form(&params)
        .send()
        .await
        .context("failed to reach Google token endpoint")?;
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(anyhow!("refresh token grant failed {}: {}", status, body));
    }
    let token: TokenResponse = res
        .json()
        .await
        .context("invalid token endpoint response")?;
    Ok(token.access_token)
}

/// Subset of a Google service-account key file.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

async fn jwt_grant(http: &Client, key_path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(key_path)
        .await
        .with_context(|| format!("failed to read service account key {}", key_path.display()))?;
    let key: ServiceAccountKey =
        serde_json::from_str(&raw).context("invalid service account key JSON")?;

    let iat = Utc::now().timestamp();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + 3600,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("invalid service account private key")?;
    let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .context("failed to sign service account assertion")?;

    let params = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", assertion.as_str()),
    ];
    let res = http
        .post(&key.token_uri)
        .form(&params)
        .send()
        .await
        .context("failed to reach service account token endpoint")?;
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(anyhow!("service account grant failed {}: {}", status, body));
    }
    let token: TokenResponse = res
        .json()
        .await
        .context("invalid token endpoint response")?;
    Ok(token.access_token)
}
