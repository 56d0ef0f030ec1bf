//! Multi-service fan-out
//!
//! Uploads one file to every enabled backend concurrently, keeping results
//! in the enabled order. The primary service is the first enabled backend
//! that succeeded; side effects (clipboard, notification) fire only when at
//! least one backend succeeded, while the history record is written even on
//! total failure so the user can retry per service later.

use picrelay_core::{HistoryItem, ServiceUploadResult, UploadError, UserConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::link::generate_link;
use crate::orchestrator::Uploader;
use crate::progress::ProgressSender;

/// The aggregate of one fan-out run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiUploadOutcome {
    /// First enabled backend that succeeded.
    pub primary_service: Option<String>,
    /// Raw URL reported by the primary backend.
    pub primary_url: Option<String>,
    /// Per-backend results, in the enabled order.
    pub results: Vec<ServiceUploadResult>,
}

impl MultiUploadOutcome {
    pub fn any_success(&self) -> bool {
        self.primary_service.is_some()
    }
}

/// What the queue gets back after the fan-out plus recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedUpload {
    /// Id of the history record written for this run.
    pub history_id: String,
    /// Final user-facing link, present when any backend succeeded.
    pub link: Option<String>,
    pub outcome: MultiUploadOutcome,
}

impl Uploader {
    /// Upload one file to every listed backend concurrently. Never fails as
    /// a whole; a missing backend or credential becomes a failed entry for
    /// that service.
    pub async fn upload_to_services(
        &self,
        file_path: &Path,
        enabled: &[String],
        config: &UserConfig,
        progress: &ProgressSender,
    ) -> MultiUploadOutcome {
        let uploads = enabled.iter().map(|service_id| async move {
            let Some(backend) = self.backend(service_id) else {
                return ServiceUploadResult::failed(
                    service_id,
                    format!("No uploader registered for '{}'", service_id),
                );
            };
            let Some(credentials) = config.credentials_for(service_id) else {
                return ServiceUploadResult::failed(
                    service_id,
                    format!("Missing credentials for '{}'", service_id),
                );
            };

            match backend.upload(file_path, credentials, progress).await {
                Ok(image) => {
                    progress.send(service_id, 100);
                    ServiceUploadResult::success(service_id, image)
                }
                Err(err) => {
                    tracing::warn!(service = %service_id, error = %err, kind = ?err.kind, "Backend upload failed");
                    ServiceUploadResult::failed(service_id, err.to_string())
                }
            }
        });

        // join_all keeps the enabled order, so "first success" below is the
        // first *enabled* success regardless of completion order.
        let results = futures::future::join_all(uploads).await;

        let primary = results.iter().find(|r| r.is_success());
        MultiUploadOutcome {
            primary_service: primary.map(|r| r.service_id.clone()),
            primary_url: primary.and_then(|r| r.result.as_ref()).map(|i| i.url.clone()),
            results,
        }
    }

    /// Queue entry point: fan out to the config's enabled backends, generate
    /// the link from the primary success, fire clipboard/notification on
    /// success, and record the run in history even when every backend
    /// failed.
    #[tracing::instrument(skip(self, config, progress), fields(path = %file_path.display()))]
    pub async fn process_multi_upload(
        &self,
        file_path: &Path,
        config: &UserConfig,
        progress: &ProgressSender,
    ) -> Result<ProcessedUpload, UploadError> {
        if tokio::fs::metadata(file_path).await.is_err() {
            return Err(UploadError::file_not_found(format!(
                "File not found: {}",
                file_path.display()
            )));
        }
        if config.enabled_services.is_empty() {
            return Err(UploadError::unknown("No upload service is enabled"));
        }

        let outcome = self
            .upload_to_services(file_path, &config.enabled_services, config, progress)
            .await;

        let link = outcome.primary_service.as_ref().and_then(|primary| {
            let result = outcome.results.iter().find(|r| &r.service_id == primary)?;
            let image = result.result.as_ref()?;
            let generated = generate_link(&image.url, image.file_key.as_deref(), config);
            if let Some(warning) = &generated.warning {
                self.notify("Link fallback", warning);
            }
            Some(generated.link)
        });

        match &link {
            Some(link) => {
                if let Some(clipboard) = self.clipboard() {
                    if let Err(e) = clipboard.write_text(link) {
                        tracing::warn!(error = %e, "Clipboard write failed");
                    }
                }
                self.notify("Upload complete", link);
            }
            None => {
                self.notify("Upload failed", "All upload services failed");
            }
        }

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        let item = HistoryItem {
            id: picrelay_core::generate_item_id(),
            timestamp: chrono::Utc::now(),
            local_file_name: file_name,
            file_path: Some(file_path.display().to_string()),
            primary_service: outcome
                .primary_service
                .clone()
                .unwrap_or_else(|| config.enabled_services[0].clone()),
            results: outcome.results.clone(),
            generated_link: link.clone().unwrap_or_default(),
        };
        let history_id = item.id.clone();

        if let Err(e) = self.history().append(item).await {
            tracing::error!(error = %e, "Failed to persist history item");
        }
        self.spawn_history_sync(config);

        Ok(ProcessedUpload {
            history_id,
            link,
            outcome,
        })
    }

    /// Re-run a single backend for an existing history item and patch its
    /// result in place. A success on an item that previously had none
    /// promotes the backend to primary and regenerates the link.
    pub async fn retry_upload(
        &self,
        history_id: &str,
        file_path: &Path,
        service_id: &str,
        config: &UserConfig,
        progress: &ProgressSender,
    ) -> Result<ServiceUploadResult, UploadError> {
        if tokio::fs::metadata(file_path).await.is_err() {
            return Err(UploadError::file_not_found(format!(
                "File not found: {}",
                file_path.display()
            )));
        }
        let Some(backend) = self.backend(service_id) else {
            return Err(UploadError::unknown(format!(
                "No uploader registered for '{}'",
                service_id
            )));
        };
        let Some(credentials) = config.credentials_for(service_id) else {
            return Err(UploadError::unknown(format!(
                "Missing credentials for '{}'",
                service_id
            )));
        };

        let (result, new_link) = match backend.upload(file_path, credentials, progress).await {
            Ok(image) => {
                progress.send(service_id, 100);
                let generated = generate_link(&image.url, image.file_key.as_deref(), config);
                (
                    ServiceUploadResult::success(service_id, image),
                    Some(generated.link),
                )
            }
            Err(err) => (ServiceUploadResult::failed(service_id, err.to_string()), None),
        };

        match self
            .history()
            .patch_result(history_id, result.clone(), new_link)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(history_id, "Retry finished but no matching history item")
            }
            Err(e) => tracing::error!(error = %e, history_id, "Failed to patch history item"),
        }

        Ok(result)
    }
}
