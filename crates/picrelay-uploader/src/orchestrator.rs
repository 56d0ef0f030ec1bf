//! Single-backend orchestration
//!
//! Drives one file through the primary backend and the surrounding side
//! effects: link generation, clipboard, notification, the bounded R2 backup,
//! the history write, and the detached history sync. Only the primary upload
//! itself can abort the operation; everything after it is best-effort.

use picrelay_core::{
    HistoryItem, ServiceCredentials, ServiceUploadResult, UploadError, UploadErrorKind, UserConfig,
};
use picrelay_store::EncryptedStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::history::HistoryService;
use crate::link::generate_link;
use crate::progress::ProgressSender;
use crate::retry_queue::RetryQueue;
use crate::traits::{
    Clipboard, CredentialRefresher, HistorySync, Notifier, ObjectStorage, ServiceUploader,
};

/// Document key of the settings object in the settings store.
pub const SETTINGS_KEY: &str = "config";

/// Service id under which the backup copy is recorded in history results.
pub const BACKUP_SERVICE_ID: &str = "r2";

/// The backup step is abandoned after this long; the primary result is
/// unaffected.
const BACKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Primary upload succeeded; a link was produced.
    Success,
    /// Primary upload failed with a retryable error; queued for retry.
    Failed,
    /// Blocking error (validation or non-retryable failure).
    Error,
}

/// What the caller gets back from the single-backend path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadOutcome {
    fn success(link: String) -> Self {
        Self {
            status: OutcomeStatus::Success,
            link: Some(link),
            message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            link: None,
            message: Some(message.into()),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            link: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Make the redundant object-storage copy after the primary succeeds.
    pub upload_to_r2: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { upload_to_r2: true }
    }
}

/// The upload orchestrator. Collaborators are injected; absent optional
/// collaborators simply skip their side effect.
pub struct Uploader {
    backends: HashMap<String, Arc<dyn ServiceUploader>>,
    settings: Arc<EncryptedStore>,
    history: HistoryService,
    retry_queue: RetryQueue,
    backup: Option<Arc<dyn ObjectStorage>>,
    clipboard: Option<Arc<dyn Clipboard>>,
    notifier: Option<Arc<dyn Notifier>>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    history_sync: Option<Arc<dyn HistorySync>>,
    backup_timeout: Duration,
}

impl Uploader {
    pub fn new(settings: Arc<EncryptedStore>, history: HistoryService, retry_queue: RetryQueue) -> Self {
        Self {
            backends: HashMap::new(),
            settings,
            history,
            retry_queue,
            backup: None,
            clipboard: None,
            notifier: None,
            refresher: None,
            history_sync: None,
            backup_timeout: BACKUP_TIMEOUT,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ServiceUploader>) -> Self {
        self.backends.insert(backend.service_id().to_string(), backend);
        self
    }

    pub fn with_backup(mut self, backup: Arc<dyn ObjectStorage>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_history_sync(mut self, sync: Arc<dyn HistorySync>) -> Self {
        self.history_sync = Some(sync);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_backup_timeout(mut self, timeout: Duration) -> Self {
        self.backup_timeout = timeout;
        self
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    pub(crate) fn backend(&self, service_id: &str) -> Option<&Arc<dyn ServiceUploader>> {
        self.backends.get(service_id)
    }

    pub(crate) fn clipboard(&self) -> Option<&Arc<dyn Clipboard>> {
        self.clipboard.as_ref()
    }

    /// Legacy single-backend entry point: upload to the primary backend with
    /// default options and no progress consumer.
    pub async fn handle_file_upload(&self, file_path: &str, config: &UserConfig) -> UploadOutcome {
        self.process_upload(file_path, config, UploadOptions::default(), ProgressSender::disabled())
            .await
    }

    /// Single-backend upload with explicit options and a progress stream.
    #[tracing::instrument(skip(self, config, progress), fields(path = %file_path))]
    pub async fn process_upload(
        &self,
        file_path: &str,
        config: &UserConfig,
        options: UploadOptions,
        progress: ProgressSender,
    ) -> UploadOutcome {
        let path = Path::new(file_path);
        if tokio::fs::metadata(path).await.is_err() {
            return self.validation_error(format!("File not found: {}", file_path));
        }

        let Some(service_id) = config.primary_service().map(str::to_string) else {
            return self.validation_error("No upload service is enabled".to_string());
        };
        let Some(backend) = self.backends.get(&service_id).cloned() else {
            return self.validation_error(format!("No uploader registered for '{}'", service_id));
        };
        if config.credentials_for(&service_id).is_none() {
            return self.validation_error(format!("Missing credentials for '{}'", service_id));
        }

        // The relogin path rewrites the credential, so work on a copy.
        let mut config = config.clone();
        let mut allow_relogin = true;

        loop {
            // Credentials verified present above and only replaced since.
            let credentials = match config.credentials_for(&service_id) {
                Some(c) => c.clone(),
                None => return self.validation_error(format!("Missing credentials for '{}'", service_id)),
            };

            match backend.upload(path, &credentials, &progress).await {
                Ok(image) => {
                    progress.send(&service_id, 100);
                    return self
                        .finish_single(path, file_path, &service_id, image, &config, options)
                        .await;
                }
                Err(err) if err.kind == UploadErrorKind::CookieExpired && allow_relogin => {
                    allow_relogin = false;
                    match self.try_relogin(&service_id, &mut config).await {
                        Ok(true) => {
                            tracing::info!(service = %service_id, "Credential refreshed, retrying upload");
                            continue;
                        }
                        Ok(false) => return self.fail_single(file_path, &config, err).await,
                        Err(relogin_err) => {
                            return self.fail_single(file_path, &config, relogin_err).await
                        }
                    }
                }
                Err(err) => return self.fail_single(file_path, &config, err).await,
            }
        }
    }

    /// Replay one retry-queue entry with its config snapshot; remove it on
    /// success.
    pub async fn retry_failed(&self, id: &str) -> UploadOutcome {
        let item = match self.retry_queue.get(id).await {
            Ok(Some(item)) => item,
            Ok(None) => return UploadOutcome::error(format!("No failed item with id '{}'", id)),
            Err(e) => return UploadOutcome::error(e.to_string()),
        };

        let outcome = self.handle_file_upload(&item.file_path, &item.config).await;
        if outcome.status == OutcomeStatus::Success {
            if let Err(e) = self.retry_queue.remove(id).await {
                tracing::error!(error = %e, id, "Failed to drop retried item from queue");
            }
        }
        outcome
    }

    /// Replay every queued failure, oldest first.
    pub async fn retry_all_failed(&self) -> Vec<(String, UploadOutcome)> {
        let items = match self.retry_queue.items().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read retry queue");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let outcome = self.retry_failed(&item.id).await;
            outcomes.push((item.id, outcome));
        }
        outcomes
    }

    fn validation_error(&self, message: String) -> UploadOutcome {
        tracing::warn!(message, "Upload rejected by validation");
        self.notify("Upload failed", &message);
        UploadOutcome::error(message)
    }

    async fn try_relogin(
        &self,
        service_id: &str,
        config: &mut UserConfig,
    ) -> Result<bool, UploadError> {
        let (Some(refresher), Some(account)) = (&self.refresher, config.account.clone()) else {
            return Ok(false);
        };

        let cookie = refresher.relogin(&account).await?;
        config
            .credentials
            .insert(service_id.to_string(), ServiceCredentials::new(cookie));

        // Persist the refreshed credential so the next upload starts healthy.
        if let Err(e) = self.settings.set(SETTINGS_KEY, config).await {
            tracing::error!(error = %e, "Failed to persist refreshed credentials");
        }
        Ok(true)
    }

    async fn finish_single(
        &self,
        path: &Path,
        file_path: &str,
        service_id: &str,
        image: picrelay_core::UploadedImage,
        config: &UserConfig,
        options: UploadOptions,
    ) -> UploadOutcome {
        let generated = generate_link(&image.url, image.file_key.as_deref(), config);
        if let Some(warning) = &generated.warning {
            self.notify("Link fallback", warning);
        }

        if let Some(clipboard) = &self.clipboard {
            if let Err(e) = clipboard.write_text(&generated.link) {
                tracing::warn!(error = %e, "Clipboard write failed");
            }
        }
        self.notify("Upload complete", &generated.link);

        let mut results = vec![ServiceUploadResult::success(service_id, image)];
        if options.upload_to_r2 {
            if let Some(backup_result) = self.backup_copy(path, config).await {
                results.push(backup_result);
            }
        }

        let item = HistoryItem {
            id: picrelay_core::generate_item_id(),
            timestamp: chrono::Utc::now(),
            local_file_name: file_name_of(path),
            file_path: Some(file_path.to_string()),
            primary_service: service_id.to_string(),
            results,
            generated_link: generated.link.clone(),
        };

        if let Err(e) = self.history.append(item).await {
            tracing::error!(error = %e, "Failed to persist history item");
        }
        self.spawn_history_sync(config);

        UploadOutcome::success(generated.link)
    }

    async fn fail_single(
        &self,
        file_path: &str,
        config: &UserConfig,
        err: UploadError,
    ) -> UploadOutcome {
        tracing::warn!(error = %err, kind = ?err.kind, path = %file_path, "Primary upload failed");
        self.notify("Upload failed", &err.message);

        if err.is_retryable() {
            match self.retry_queue.add(file_path, config.clone(), err.to_string()).await {
                Ok(_) => UploadOutcome::failed(err.to_string()),
                Err(store_err) => {
                    tracing::error!(error = %store_err, "Failed to enqueue retry item");
                    UploadOutcome::error(err.to_string())
                }
            }
        } else {
            UploadOutcome::error(err.to_string())
        }
    }

    /// Make the redundant object-storage copy, bounded by the backup
    /// timeout. Never affects the overall outcome; returns the result entry
    /// to record, if any.
    async fn backup_copy(&self, path: &Path, config: &UserConfig) -> Option<ServiceUploadResult> {
        let backup = self.backup.as_ref()?;
        let r2 = config.r2.as_ref()?;

        let file_name = file_name_of(path);
        let key = {
            let prefix = r2.path.trim_matches('/');
            if prefix.is_empty() {
                file_name.clone()
            } else {
                format!("{}/{}", prefix, file_name)
            }
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Backup skipped, file read failed");
                return Some(ServiceUploadResult::failed(BACKUP_SERVICE_ID, e.to_string()));
            }
        };
        let content_type = content_type_of(path);

        match tokio::time::timeout(self.backup_timeout, backup.put(&key, bytes, content_type)).await
        {
            Ok(Ok(())) => {
                tracing::debug!(key = %key, "Backup copy stored");
                Some(ServiceUploadResult::success(
                    BACKUP_SERVICE_ID,
                    picrelay_core::UploadedImage {
                        url: String::new(),
                        file_key: Some(key),
                    },
                ))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Backup copy failed");
                self.notify("Backup failed", &e.message);
                Some(ServiceUploadResult::failed(BACKUP_SERVICE_ID, e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.backup_timeout, "Backup copy abandoned after timeout");
                self.notify("Backup failed", "Backup timed out");
                Some(ServiceUploadResult::failed(BACKUP_SERVICE_ID, "Backup timed out"))
            }
        }
    }

    /// Push the history snapshot to the configured mirror as a detached
    /// task; never awaited on the upload path.
    pub(crate) fn spawn_history_sync(&self, config: &UserConfig) {
        let (Some(sync), Some(webdav)) = (self.history_sync.clone(), config.webdav.clone()) else {
            return;
        };
        let history = self.history.clone();
        tokio::spawn(async move {
            match history.list().await {
                Ok(items) => sync.sync(items, webdav).await,
                Err(e) => tracing::warn!(error = %e, "History sync skipped, read failed"),
            }
        });
    }

    pub(crate) fn notify(&self, title: &str, body: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(title, body);
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string()
}

fn content_type_of(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
