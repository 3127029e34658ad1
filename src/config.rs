//! Configuration loader and validator for the Drive→Notion relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub google: Google,
    pub notion: Notion,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Google Drive API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Google {
    pub client_id: String,
    pub client_secret: String,
    /// Shared-drive id the watch channel is scoped to.
    pub drive_id: String,
    /// Public base URL webhook pings are delivered to; the subscription id
    /// is appended as a path segment at registration time.
    pub webhook_url: String,
    /// Path to a service-account key JSON file. Used for subscriptions that
    /// carry no refresh token of their own.
    #[serde(default)]
    pub service_account_key: Option<String>,
}

/// Notion API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notion {
    /// Fallback integration token for subscriptions registered without one.
    pub token: String,
    pub version: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.google.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("google.client_id must be non-empty"));
    }
    if cfg.google.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "google.client_secret must be non-empty",
        ));
    }
    if cfg.google.drive_id.trim().is_empty() {
        return Err(ConfigError::Invalid("google.drive_id must be non-empty"));
    }
    if cfg.google.webhook_url.trim().is_empty() {
        return Err(ConfigError::Invalid("google.webhook_url must be non-empty"));
    }
    if !cfg.google.webhook_url.starts_with("https://") {
        return Err(ConfigError::Invalid("google.webhook_url must be https"));
    }
    if let Some(key) = &cfg.google.service_account_key {
        if key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "google.service_account_key must be non-empty when set",
            ));
        }
    }

    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.token must be non-empty"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, used by tests and `--help` documentation.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

google:
  client_id: "YOUR_GOOGLE_CLIENT_ID"
  client_secret: "YOUR_GOOGLE_CLIENT_SECRET"
  drive_id: "YOUR_SHARED_DRIVE_ID"
  webhook_url: "https://relay.example.com/webhook"
  service_account_key: "service-account-key.json"

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_google_credentials() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.client_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("client_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.client_secret = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn webhook_url_must_be_https() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.webhook_url = "http://relay.example.com/webhook".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("https")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_notion_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notion.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("notion.token")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notion.version = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn service_account_key_is_optional() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.google.service_account_key = None;
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.notion.version, "2022-06-28");
    }
}
