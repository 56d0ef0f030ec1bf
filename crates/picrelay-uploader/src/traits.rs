//! Trait seams for the orchestrator's collaborators
//!
//! Every external surface — backend wire protocols, the object-storage
//! backup target, clipboard, notifications, relogin, and the history
//! mirror — is an injected trait object so the core stays testable with
//! in-memory fakes.

use async_trait::async_trait;
use picrelay_core::{
    AccountCredentials, HistoryItem, ServiceCredentials, UploadError, UploadedImage, WebDavConfig,
};
use std::path::Path;

use crate::progress::ProgressSender;

/// One image-hosting backend. Implementations own the wire protocol and
/// classify their failures into [`UploadError`] kinds at this boundary.
#[async_trait]
pub trait ServiceUploader: Send + Sync {
    fn service_id(&self) -> &str;

    async fn upload(
        &self,
        file_path: &Path,
        credentials: &ServiceCredentials,
        progress: &ProgressSender,
    ) -> Result<UploadedImage, UploadError>;
}

/// S3-compatible object storage used for the redundant backup copy.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), UploadError>;
}

/// Clipboard sink. Failures never abort an upload.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

/// OS notification sink, fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Produces a fresh cookie string for a stored account when the current one
/// has expired. The browser-automation flow behind it is out of scope here.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn relogin(&self, account: &AccountCredentials) -> Result<String, UploadError>;
}

/// Best-effort mirror of the history snapshot (WebDAV in production).
/// Contract: try once, report nothing upward.
#[async_trait]
pub trait HistorySync: Send + Sync {
    async fn sync(&self, items: Vec<HistoryItem>, config: WebDavConfig);
}
