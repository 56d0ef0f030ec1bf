use picrelay_core::{QueueItem, QueueStatus, ServiceProgress, UserConfig};
use picrelay_uploader::{ProgressSender, Uploader};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};

/// Drives queued files through the orchestrator, at most
/// `config.max_concurrent` at a time. Queue entries are observable snapshots
/// for the UI; all durable state is written by the orchestrator.
pub struct QueueManager {
    uploader: Arc<Uploader>,
    items: Mutex<Vec<QueueItem>>,
}

impl QueueManager {
    pub fn new(uploader: Arc<Uploader>) -> Self {
        Self {
            uploader,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue one file as pending. Returns the new entry's id.
    pub fn add_file(&self, file_path: &str, config: &UserConfig) -> String {
        let file_name = Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        let mut item = QueueItem::new(file_path, file_name, config.enabled_services.clone());
        for service in &item.enabled_services {
            item.service_progress
                .insert(service.clone(), ServiceProgress::default());
        }
        let id = item.id.clone();

        self.items.lock().unwrap().push(item);
        tracing::debug!(id = %id, path = %file_path, "File queued");
        id
    }

    /// Process every pending entry, at most `config.max_concurrent`
    /// concurrently. Returns once all of them are terminal.
    #[tracing::instrument(skip(self, config))]
    pub async fn process_all(self: &Arc<Self>, config: &UserConfig) {
        let pending: Vec<String> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .map(|item| item.id.clone())
            .collect();
        if pending.is_empty() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let progress_consumer = tokio::spawn({
            let manager = Arc::clone(self);
            async move { manager.consume_progress(rx).await }
        });

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(pending.len());
        for id in pending {
            let manager = Arc::clone(self);
            let config = config.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = ProgressSender::new(tx.clone()).for_item(id.clone());
            handles.push(tokio::spawn(async move {
                // Closed only if process_all is aborted.
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                manager.process_one(&id, &config, &progress).await;
            }));
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue worker panicked");
            }
        }
        let _ = progress_consumer.await;
    }

    async fn process_one(&self, id: &str, config: &UserConfig, progress: &ProgressSender) {
        let Some(file_path) = self.mark_uploading(id) else {
            return;
        };

        match self
            .uploader
            .process_multi_upload(Path::new(&file_path), config, progress)
            .await
        {
            Ok(processed) => {
                // Per-service links come from the fan-out results.
                self.with_item(id, |item| {
                    for result in &processed.outcome.results {
                        let entry = item
                            .service_progress
                            .entry(result.service_id.clone())
                            .or_default();
                        if let Some(image) = &result.result {
                            entry.percent = 100;
                            entry.link = Some(image.url.clone());
                        }
                    }
                });
                match processed.link {
                    Some(link) => self.mark_item_complete(id, link),
                    None => self.mark_item_failed(id, "All upload services failed"),
                }
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "Queue entry rejected");
                self.mark_item_failed(id, err.to_string());
            }
        }
    }

    async fn consume_progress(&self, mut rx: mpsc::UnboundedReceiver<picrelay_uploader::ProgressEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(item_id) = event.item_id else {
                continue;
            };
            self.with_item(&item_id, |item| {
                let entry = item
                    .service_progress
                    .entry(event.service_id.clone())
                    .or_default();
                // Progress never moves backwards.
                entry.percent = entry.percent.max(event.percent);
            });
        }
    }

    pub fn mark_item_complete(&self, id: &str, link: impl Into<String>) {
        let link = link.into();
        self.with_item(id, |item| {
            item.status = QueueStatus::Complete;
            item.link = Some(link.clone());
            item.message = None;
        });
    }

    pub fn mark_item_failed(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        self.with_item(id, |item| {
            item.status = QueueStatus::Failed;
            item.message = Some(message.clone());
        });
    }

    pub fn get_item(&self, id: &str) -> Option<QueueItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Snapshot of all entries in insertion order.
    pub fn items(&self) -> Vec<QueueItem> {
        self.items.lock().unwrap().clone()
    }

    /// Drop terminal entries; returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|item| !item.is_terminal());
        before - items.len()
    }

    fn mark_uploading(&self, id: &str) -> Option<String> {
        let mut items = self.items.lock().unwrap();
        let item = items.iter_mut().find(|item| item.id == id)?;
        item.status = QueueStatus::Uploading;
        Some(item.file_path.clone())
    }

    fn with_item(&self, id: &str, f: impl FnOnce(&mut QueueItem)) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            f(item);
        }
    }
}
