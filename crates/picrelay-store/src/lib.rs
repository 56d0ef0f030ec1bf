//! Encrypted JSON document store
//!
//! One file per logical store (settings, history, retry queue). Each file
//! holds a single JSON object encrypted at rest with AES-256-GCM; keys of
//! that object are the store's slots. Not a general-purpose KV engine:
//! single process, whole-document read-modify-write, per-document async
//! lock.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{EncryptedStore, HISTORY_KEY, MAX_HISTORY_ENTRIES};
