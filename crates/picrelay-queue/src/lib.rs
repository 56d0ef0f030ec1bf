//! In-memory upload queue
//!
//! Holds the UI-facing queue entries for one batch of files and drives them
//! through the orchestrator under a bounded concurrency limit. Entries are
//! not persisted; durable state lives in the history store and the retry
//! queue.

mod queue;

pub use queue::QueueManager;
