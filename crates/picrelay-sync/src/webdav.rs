use async_trait::async_trait;
use picrelay_core::{HistoryItem, UploadError, WebDavConfig};
use picrelay_uploader::HistorySync;
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Snapshot pushes give up after this long.
const SYNC_TIMEOUT: Duration = Duration::from_secs(15);

/// History mirror over WebDAV. One JSON document per account, overwritten on
/// every push.
pub struct WebDavSync {
    client: reqwest::Client,
}

impl WebDavSync {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Verify the configured server and path are reachable with the given
    /// credentials (PROPFIND, depth 0).
    pub async fn check(&self, config: &WebDavConfig) -> Result<(), UploadError> {
        let url = target_url(config);
        let propfind =
            Method::from_bytes(b"PROPFIND").map_err(|e| UploadError::unknown(e.to_string()))?;

        let response = self
            .client
            .request(propfind, &url)
            .basic_auth(&config.username, Some(&config.password))
            .header("Depth", "0")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::MULTI_STATUS => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploadError::unknown(
                "WebDAV authentication failed; check username and password",
            )),
            StatusCode::NOT_FOUND => Err(UploadError::file_not_found(format!(
                "WebDAV path not found: {}",
                url
            ))),
            status => Err(UploadError::server(
                status.as_u16(),
                format!("WebDAV probe failed with status {}", status),
            )),
        }
    }

    async fn push(&self, items: &[HistoryItem], config: &WebDavConfig) -> Result<(), UploadError> {
        let url = target_url(config);
        let body = serde_json::to_vec(items)?;

        let response = self
            .client
            .put(&url)
            .basic_auth(&config.username, Some(&config.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(count = items.len(), url = %url, "History snapshot mirrored");
            Ok(())
        } else {
            Err(UploadError::server(
                status.as_u16(),
                format!("WebDAV upload failed with status {}", status),
            ))
        }
    }
}

impl Default for WebDavSync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistorySync for WebDavSync {
    async fn sync(&self, items: Vec<HistoryItem>, config: WebDavConfig) {
        if let Err(e) = self.push(&items, &config).await {
            tracing::warn!(error = %e, kind = ?e.kind, "History sync failed");
        }
    }
}

/// Resolve the document URL from the server URL and the remote path. A path
/// ending in `/` is a directory and gets `history.json` appended; a path not
/// ending in `.json` is also treated as a directory.
fn target_url(config: &WebDavConfig) -> String {
    let base = config.url.trim_end_matches('/');
    let path = config.remote_path.trim_start_matches('/');

    let document = if path.is_empty() || path.ends_with('/') {
        format!("{}history.json", path)
    } else if !path.ends_with(".json") {
        format!("{}/history.json", path)
    } else {
        path.to_string()
    };

    format!("{}/{}", base, document)
}
