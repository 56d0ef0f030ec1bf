//! Upload history over the encrypted store (document key `uploads`).
//!
//! The list is newest-first; the store enforces the entry cap on every
//! persisted write.

use picrelay_core::{HistoryItem, ServiceUploadResult};
use picrelay_store::{EncryptedStore, StoreResult, HISTORY_KEY};
use std::sync::Arc;

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<EncryptedStore>,
}

impl HistoryService {
    pub fn new(store: Arc<EncryptedStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> StoreResult<Vec<HistoryItem>> {
        self.store.get_or_default(HISTORY_KEY, Vec::new()).await
    }

    /// Prepend one item (newest-first). The read-modify-write runs under
    /// the store's document lock, so concurrent appends never lose items.
    pub async fn append(&self, item: HistoryItem) -> StoreResult<()> {
        self.store
            .update(HISTORY_KEY, Vec::new(), |items: &mut Vec<HistoryItem>| {
                items.insert(0, item);
            })
            .await?;
        Ok(())
    }

    /// Replace one backend's result inside an existing item. When the item
    /// had no successful result yet and the patch is a success, the patched
    /// backend is promoted to primary and the generated link replaced.
    ///
    /// Returns the updated item, or `None` when no item matches.
    pub async fn patch_result(
        &self,
        item_id: &str,
        patch: ServiceUploadResult,
        new_link: Option<String>,
    ) -> StoreResult<Option<HistoryItem>> {
        let mut updated = None;
        self.store
            .update(HISTORY_KEY, Vec::new(), |items: &mut Vec<HistoryItem>| {
                let Some(item) = items.iter_mut().find(|item| item.id == item_id) else {
                    return;
                };

                let had_success = item.results.iter().any(|r| r.is_success());
                let promote = !had_success && patch.is_success();

                match item
                    .results
                    .iter_mut()
                    .find(|r| r.service_id == patch.service_id)
                {
                    Some(existing) => *existing = patch.clone(),
                    None => item.results.push(patch.clone()),
                }

                if promote {
                    item.primary_service = patch.service_id.clone();
                    if let Some(link) = new_link {
                        item.generated_link = link;
                    } else if let Some(result) = &patch.result {
                        item.generated_link = result.url.clone();
                    }
                }

                updated = Some(item.clone());
            })
            .await?;
        Ok(updated)
    }

    /// Remove items by id. Returns how many were deleted.
    pub async fn delete(&self, ids: &[String]) -> StoreResult<usize> {
        let mut removed = 0;
        self.store
            .update(HISTORY_KEY, Vec::new(), |items: &mut Vec<HistoryItem>| {
                let before = items.len();
                items.retain(|item| !ids.contains(&item.id));
                removed = before - items.len();
            })
            .await?;
        Ok(removed)
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.set(HISTORY_KEY, &Vec::<HistoryItem>::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use picrelay_core::{generate_item_id, EncryptionService, UploadedImage};

    async fn service(dir: &tempfile::TempDir) -> HistoryService {
        let cipher = EncryptionService::from_key_bytes(b"01234567890123456789012345678901").unwrap();
        let store = EncryptedStore::open(dir.path().join("history.json"), cipher)
            .await
            .unwrap();
        HistoryService::new(Arc::new(store))
    }

    fn item(name: &str, results: Vec<ServiceUploadResult>) -> HistoryItem {
        let primary = results
            .iter()
            .find(|r| r.is_success())
            .map(|r| r.service_id.clone())
            .unwrap_or_else(|| results.first().map(|r| r.service_id.clone()).unwrap_or_default());
        let link = results
            .iter()
            .find(|r| r.is_success())
            .and_then(|r| r.result.as_ref())
            .map(|i| i.url.clone())
            .unwrap_or_default();
        HistoryItem {
            id: generate_item_id(),
            timestamp: Utc::now(),
            local_file_name: name.to_string(),
            file_path: None,
            primary_service: primary,
            results,
            generated_link: link,
        }
    }

    #[tokio::test]
    async fn appends_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;

        history.append(item("first.png", vec![])).await.unwrap();
        history.append(item("second.png", vec![])).await.unwrap();

        let items = history.list().await.unwrap();
        assert_eq!(items[0].local_file_name, "second.png");
        assert_eq!(items[1].local_file_name, "first.png");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let history = history.clone();
            handles.push(tokio::spawn(async move {
                history.append(item(&format!("{i}.png"), vec![])).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut names: Vec<_> = history
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.local_file_name)
            .collect();
        names.sort();
        let expected: Vec<_> = (0..10).map(|i| format!("{i}.png")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn patch_promotes_first_success_to_primary() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;

        let failed = item(
            "cat.png",
            vec![
                ServiceUploadResult::failed("weibo", "timeout"),
                ServiceUploadResult::failed("smms", "500"),
            ],
        );
        let id = failed.id.clone();
        history.append(failed).await.unwrap();

        let patch = ServiceUploadResult::success(
            "smms",
            UploadedImage {
                url: "https://smms.example.com/cat.png".into(),
                file_key: None,
            },
        );
        let updated = history.patch_result(&id, patch, None).await.unwrap().unwrap();
        assert_eq!(updated.primary_service, "smms");
        assert_eq!(updated.generated_link, "https://smms.example.com/cat.png");
        assert!(updated.results.iter().any(|r| r.service_id == "smms" && r.is_success()));
    }

    #[tokio::test]
    async fn patch_keeps_existing_primary() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;

        let existing = item(
            "cat.png",
            vec![
                ServiceUploadResult::success(
                    "weibo",
                    UploadedImage { url: "https://weibo.example.com/a".into(), file_key: None },
                ),
                ServiceUploadResult::failed("smms", "500"),
            ],
        );
        let id = existing.id.clone();
        history.append(existing).await.unwrap();

        let patch = ServiceUploadResult::success(
            "smms",
            UploadedImage { url: "https://smms.example.com/a".into(), file_key: None },
        );
        let updated = history.patch_result(&id, patch, None).await.unwrap().unwrap();
        assert_eq!(updated.primary_service, "weibo");
        assert_eq!(updated.generated_link, "https://weibo.example.com/a");
    }

    #[tokio::test]
    async fn patch_unknown_item_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;
        let patch = ServiceUploadResult::failed("weibo", "x");
        assert!(history.patch_result("missing", patch, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_matching_ids() {
        let dir = tempfile::tempdir().unwrap();
        let history = service(&dir).await;

        let a = item("a.png", vec![]);
        let b = item("b.png", vec![]);
        let id_a = a.id.clone();
        history.append(a).await.unwrap();
        history.append(b).await.unwrap();

        let removed = history.delete(&[id_a]).await.unwrap();
        assert_eq!(removed, 1);
        let items = history.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].local_file_name, "b.png");
    }
}
