//! Upload error types
//!
//! Backend upload failures are tagged at the call boundary with an explicit
//! error kind instead of being recovered later by message matching. The kind
//! decides whether the attempt goes to the retry queue (retryable), fails the
//! operation outright (non-retryable), or takes the relogin path
//! (`CookieExpired`).

use serde::{Deserialize, Serialize};

/// Classified upload failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status")]
pub enum UploadErrorKind {
    /// Session cookie rejected as expired; eligible for the auto-relogin path.
    CookieExpired,
    /// Credential malformed or revoked; relogin will not help.
    InvalidCookie,
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// Request exceeded its deadline.
    Timeout,
    /// Backend returned a 5xx status.
    Server(u16),
    /// Backend returned 429.
    RateLimited,
    FileNotFound,
    FileTooLarge,
    /// Backend response could not be parsed.
    Parse,
    Unknown,
}

/// An upload failure from one backend, carrying its classified kind.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct UploadError {
    #[serde(flatten)]
    pub kind: UploadErrorKind,
    pub message: String,
}

impl UploadError {
    pub fn new(kind: UploadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cookie_expired(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::CookieExpired, message)
    }

    pub fn invalid_cookie(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::InvalidCookie, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Timeout, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Server(status), message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::RateLimited, message)
    }

    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::FileNotFound, message)
    }

    pub fn file_too_large(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::FileTooLarge, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Parse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Unknown, message)
    }

    /// Whether a later unattended retry has a chance of succeeding.
    ///
    /// `CookieExpired` is deliberately not retryable here: it is handled by
    /// the relogin path, not the generic retry queue.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            UploadErrorKind::Network
                | UploadErrorKind::Timeout
                | UploadErrorKind::Server(_)
                | UploadErrorKind::RateLimited
        )
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(err.to_string()),
            _ => Self::unknown(format!("File read failed: {}", err)),
        }
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_connect() {
            Self::network(err.to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                429 => Self::rate_limited(err.to_string()),
                s if s >= 500 => Self::server(s, err.to_string()),
                _ => Self::unknown(err.to_string()),
            }
        } else {
            Self::network(err.to_string())
        }
    }
}
