//! User configuration
//!
//! Unlike service-side configuration this is not read from the environment:
//! it is a persisted document owned by the settings store (key `config`),
//! written by the UI and read by every upload. Wire names are camelCase to
//! stay compatible with the frontend's settings objects.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default upload concurrency for the queue manager.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// How the distributed link is derived from the primary backend URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw backend URL, unmodified.
    Weibo,
    /// Rewrite onto the R2 public domain: `{publicDomain}/{path}/{fileKey}`.
    R2,
    /// Proxy-prefix rewrite: `{linkPrefix}{url}`.
    #[default]
    Baidu,
}

/// Per-backend credential material. The `secret` is the cookie or token
/// string the backend client sends; `extra` carries any backend-specific
/// options opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCredentials {
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ServiceCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            extra: None,
        }
    }
}

/// Cloudflare R2 backup target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub public_domain: String,
}

/// WebDAV history-mirror target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDavConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remote_path: String,
}

/// Stored account used for auto-relogin when a cookie expires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCredentials {
    pub username: String,
    pub password: String,
}

/// The settings document. A point-in-time copy of this struct travels with
/// every retry-queue entry so a replay uses the configuration that was
/// active when the upload first failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Enabled backends in fixed priority order; the first successful one
    /// supplies the canonical link.
    #[serde(default)]
    pub enabled_services: Vec<String>,
    #[serde(default)]
    pub credentials: HashMap<String, ServiceCredentials>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<R2Config>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webdav: Option<WebDavConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountCredentials>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            enabled_services: Vec::new(),
            credentials: HashMap::new(),
            output_format: OutputFormat::default(),
            link_prefix: None,
            r2: None,
            webdav: None,
            account: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl UserConfig {
    /// Primary backend for the single-service path: head of the priority list.
    pub fn primary_service(&self) -> Option<&str> {
        self.enabled_services.first().map(|s| s.as_str())
    }

    pub fn credentials_for(&self, service_id: &str) -> Option<&ServiceCredentials> {
        self.credentials.get(service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let config = UserConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: UserConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.max_concurrent, DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let config = UserConfig {
            enabled_services: vec!["weibo".into()],
            webdav: Some(WebDavConfig {
                url: "https://dav.example.com".into(),
                username: "u".into(),
                password: "p".into(),
                remote_path: "backups/".into(),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("enabledServices").is_some());
        assert!(json["webdav"].get("remotePath").is_some());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: UserConfig =
            serde_json::from_str(r#"{"enabledServices":["weibo","smms"]}"#).unwrap();
        assert_eq!(config.primary_service(), Some("weibo"));
        assert_eq!(config.output_format, OutputFormat::Baidu);
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
    }
}
