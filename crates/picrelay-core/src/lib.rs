//! Picrelay Core Library
//!
//! This crate provides the domain models, error types, user configuration,
//! and encryption primitives shared across all picrelay components.

pub mod config;
pub mod encryption;
pub mod models;
pub mod upload_error;

// Re-export commonly used types
pub use config::{
    AccountCredentials, OutputFormat, R2Config, ServiceCredentials, UserConfig, WebDavConfig,
};
pub use encryption::{EncryptionError, EncryptionService};
pub use models::{
    generate_item_id, FailedItem, HistoryItem, QueueItem, QueueStatus, ServiceProgress,
    ServiceUploadResult, UploadStatus, UploadedImage,
};
pub use upload_error::{UploadError, UploadErrorKind};
