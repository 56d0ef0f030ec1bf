//! Progress event stream
//!
//! The orchestrator publishes per-service progress to a channel and stays
//! ignorant of whoever renders it; the queue manager subscribes on the other
//! end.

use tokio::sync::mpsc;

/// One progress update for one backend within one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Queue item this upload belongs to, when driven by the queue manager.
    pub item_id: Option<String>,
    pub service_id: String,
    pub percent: u8,
}

/// Cheap, cloneable handle backends report progress through. Sending never
/// blocks and never fails the upload; a closed or absent channel drops the
/// event.
#[derive(Clone, Default)]
pub struct ProgressSender {
    item_id: Option<String>,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { item_id: None, tx: Some(tx) }
    }

    /// A sender that discards every event (single-shot uploads without a UI).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Derive a sender whose events are attributed to one queue item.
    pub fn for_item(&self, item_id: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.into()),
            tx: self.tx.clone(),
        }
    }

    pub fn send(&self, service_id: &str, percent: u8) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                item_id: self.item_id.clone(),
                service_id: service_id.to_string(),
                percent: percent.min(100),
            });
        }
    }
}
