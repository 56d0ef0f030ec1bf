//! Domain models for uploads, history, the retry queue, and the in-memory
//! upload queue.

use crate::config::UserConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// History item id: upload timestamp plus a short random suffix, unique
/// enough for a per-user local history while staying sortable by time.
pub fn generate_item_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..0x100_0000);
    format!("{}-{:06x}", millis, suffix)
}

/// The URL (and optional storage key) a backend returns for an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Failed,
}

/// Outcome of one backend attempt within one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUploadResult {
    pub service_id: String,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceUploadResult {
    pub fn success(service_id: impl Into<String>, image: UploadedImage) -> Self {
        Self {
            service_id: service_id.into(),
            status: UploadStatus::Success,
            result: Some(image),
            error: None,
        }
    }

    pub fn failed(service_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            status: UploadStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }
}

/// One persisted upload record. Created exactly once at terminal
/// success/failure; mutated afterwards only by a single-service retry
/// patching one result in place, or by bulk delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub local_file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub primary_service: String,
    pub results: Vec<ServiceUploadResult>,
    pub generated_link: String,
}

/// A failed, retryable attempt plus the full configuration it ran with,
/// so a later replay is reproducible even after settings changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub id: String,
    pub file_path: String,
    pub config: UserConfig,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedItem {
    pub fn new(
        file_path: impl Into<String>,
        config: UserConfig,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_item_id(),
            file_path: file_path.into(),
            config,
            error_message: error_message.into(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Uploading,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceProgress {
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// UI-facing queue entry. Lives only for the duration of one run; discarded
/// once the corresponding HistoryItem is durably written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub enabled_services: Vec<String>,
    #[serde(default)]
    pub service_progress: HashMap<String, ServiceProgress>,
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueueItem {
    pub fn new(
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        enabled_services: Vec<String>,
    ) -> Self {
        Self {
            id: generate_item_id(),
            file_path: file_path.into(),
            file_name: file_name.into(),
            enabled_services,
            service_progress: HashMap::new(),
            status: QueueStatus::Pending,
            link: None,
            message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, QueueStatus::Complete | QueueStatus::Failed)
    }
}
