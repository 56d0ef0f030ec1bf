//! Persisted retry queue (document key `failed`).
//!
//! Each entry is a failed, retryable attempt plus the full configuration
//! snapshot it ran with. Replays go through the orchestrator
//! ([`crate::Uploader::retry_failed`]); this type only owns persistence and
//! the count signal the UI badge watches.

use picrelay_core::{FailedItem, UserConfig};
use picrelay_store::{EncryptedStore, StoreResult};
use std::sync::Arc;
use tokio::sync::watch;

const RETRY_KEY: &str = "failed";

#[derive(Clone)]
pub struct RetryQueue {
    store: Arc<EncryptedStore>,
    count_tx: Arc<watch::Sender<usize>>,
}

impl RetryQueue {
    pub fn new(store: Arc<EncryptedStore>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            store,
            count_tx: Arc::new(count_tx),
        }
    }

    /// Observe the queue length (UI badge). The watch value is refreshed by
    /// every mutating call and by [`items`](RetryQueue::items).
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub async fn items(&self) -> StoreResult<Vec<FailedItem>> {
        let items: Vec<FailedItem> = self.store.get_or_default(RETRY_KEY, Vec::new()).await?;
        self.count_tx.send_replace(items.len());
        Ok(items)
    }

    pub async fn add(
        &self,
        file_path: impl Into<String>,
        config_snapshot: UserConfig,
        error_message: impl Into<String>,
    ) -> StoreResult<FailedItem> {
        let item = FailedItem::new(file_path, config_snapshot, error_message);
        // Read-modify-write under the store's document lock; concurrent
        // failures never lose each other's entries.
        let items = self
            .store
            .update(RETRY_KEY, Vec::new(), |items: &mut Vec<FailedItem>| {
                items.push(item.clone());
            })
            .await?;
        self.count_tx.send_replace(items.len());
        tracing::info!(id = %item.id, path = %item.file_path, "Queued failed upload for retry");
        Ok(item)
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<FailedItem>> {
        Ok(self.items().await?.into_iter().find(|item| item.id == id))
    }

    pub async fn remove(&self, id: &str) -> StoreResult<bool> {
        let mut removed = false;
        let items = self
            .store
            .update(RETRY_KEY, Vec::new(), |items: &mut Vec<FailedItem>| {
                let before = items.len();
                items.retain(|item| item.id != id);
                removed = items.len() != before;
            })
            .await?;
        self.count_tx.send_replace(items.len());
        Ok(removed)
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.set(RETRY_KEY, &Vec::<FailedItem>::new()).await?;
        self.count_tx.send_replace(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picrelay_core::EncryptionService;

    async fn queue(dir: &tempfile::TempDir) -> RetryQueue {
        let cipher = EncryptionService::from_key_bytes(b"01234567890123456789012345678901").unwrap();
        let store = EncryptedStore::open(dir.path().join("retry.json"), cipher)
            .await
            .unwrap();
        RetryQueue::new(Arc::new(store))
    }

    #[tokio::test]
    async fn add_remove_clear() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue(&dir).await;
        let mut count = queue.subscribe_count();

        let item = queue
            .add("/tmp/a.png", UserConfig::default(), "connect refused")
            .await
            .unwrap();
        assert_eq!(*count.borrow_and_update(), 1);
        assert_eq!(queue.get(&item.id).await.unwrap().unwrap().file_path, "/tmp/a.png");

        assert!(queue.remove(&item.id).await.unwrap());
        assert!(!queue.remove(&item.id).await.unwrap());
        assert_eq!(*count.borrow_and_update(), 0);

        queue.add("/tmp/b.png", UserConfig::default(), "timeout").await.unwrap();
        queue.clear().await.unwrap();
        assert!(queue.items().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue(&dir).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .add(format!("/tmp/{i}.png"), UserConfig::default(), "connect refused")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let items = queue.items().await.unwrap();
        assert_eq!(items.len(), 10);
        let mut count = queue.subscribe_count();
        assert_eq!(*count.borrow_and_update(), 10);
    }

    #[tokio::test]
    async fn entries_survive_reopen_with_config_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UserConfig::default();
        config.enabled_services.push("weibo".into());

        {
            let queue = queue(&dir).await;
            queue.add("/tmp/a.png", config.clone(), "timeout").await.unwrap();
        }

        let queue = queue(&dir).await;
        let items = queue.items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].config, config);
    }
}
