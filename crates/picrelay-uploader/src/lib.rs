//! Upload orchestration
//!
//! Drives a local file through one backend (legacy single-service path) or
//! every enabled backend concurrently (multi-service path), generates the
//! distributed link, records the outcome in the encrypted history store, and
//! feeds retryable failures into the persisted retry queue. Backend wire
//! protocols, clipboard, and notifications are trait seams injected by the
//! caller.

pub mod history;
pub mod link;
pub mod multi;
pub mod orchestrator;
pub mod progress;
pub mod retry_queue;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use history::HistoryService;
pub use link::{generate_link, GeneratedLink};
pub use multi::{MultiUploadOutcome, ProcessedUpload};
pub use orchestrator::{OutcomeStatus, UploadOptions, UploadOutcome, Uploader};
pub use progress::{ProgressEvent, ProgressSender};
pub use retry_queue::RetryQueue;
pub use traits::{
    Clipboard, CredentialRefresher, HistorySync, Notifier, ObjectStorage, ServiceUploader,
};
