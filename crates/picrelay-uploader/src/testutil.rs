//! In-memory fakes shared by the orchestrator tests.

use async_trait::async_trait;
use picrelay_core::{
    AccountCredentials, EncryptionService, HistoryItem, R2Config, ServiceCredentials, UploadError,
    UploadedImage, UserConfig, WebDavConfig,
};
use picrelay_store::EncryptedStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::history::HistoryService;
use crate::orchestrator::Uploader;
use crate::progress::ProgressSender;
use crate::retry_queue::RetryQueue;
use crate::traits::{
    Clipboard, CredentialRefresher, HistorySync, Notifier, ObjectStorage, ServiceUploader,
};

pub struct Fixture {
    dir: tempfile::TempDir,
    pub settings: Arc<EncryptedStore>,
    pub data: Arc<EncryptedStore>,
    pub clipboard: Arc<MockClipboard>,
    pub notifier: Arc<MockNotifier>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cipher = EncryptionService::from_key_bytes(&[7u8; 32]).unwrap();
        let settings = Arc::new(
            EncryptedStore::open(dir.path().join("settings.json"), cipher.clone())
                .await
                .unwrap(),
        );
        let data = Arc::new(
            EncryptedStore::open(dir.path().join("data.json"), cipher)
                .await
                .unwrap(),
        );
        Self {
            dir,
            settings,
            data,
            clipboard: Arc::new(MockClipboard::default()),
            notifier: Arc::new(MockNotifier::default()),
        }
    }

    /// A bare uploader over this fixture's stores; add collaborators with
    /// the `with_*` builders.
    pub fn uploader(&self) -> Uploader {
        Uploader::new(
            self.settings.clone(),
            HistoryService::new(self.data.clone()),
            RetryQueue::new(self.data.clone()),
        )
    }

    pub fn temp_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"fake image bytes").unwrap();
        path
    }

    /// Config with the given services enabled, each with a dummy credential.
    pub fn config(&self, services: &[&str]) -> UserConfig {
        let mut config = UserConfig::default();
        for service in services {
            config.enabled_services.push(service.to_string());
            config
                .credentials
                .insert(service.to_string(), ServiceCredentials::new("secret"));
        }
        config
    }

    pub fn r2_config(&self) -> R2Config {
        R2Config {
            account_id: "acct".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "bucket".into(),
            path: "img".into(),
            public_domain: "https://cdn.example.com".into(),
        }
    }
}

enum Behavior {
    Succeed { url: String },
    Fail { error: UploadError },
    ExpiredThenSucceed { url: String, expired: AtomicBool },
}

pub struct MockBackend {
    service_id: String,
    behavior: Behavior,
    seen_secrets: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn succeeding(service_id: &str, url: &str) -> Arc<Self> {
        Arc::new(Self {
            service_id: service_id.into(),
            behavior: Behavior::Succeed { url: url.into() },
            seen_secrets: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(service_id: &str, error: UploadError) -> Arc<Self> {
        Arc::new(Self {
            service_id: service_id.into(),
            behavior: Behavior::Fail { error },
            seen_secrets: Mutex::new(Vec::new()),
        })
    }

    /// Fails with an expired cookie on the first call, then succeeds.
    pub fn expired_then_succeeding(service_id: &str, url: &str) -> Arc<Self> {
        Arc::new(Self {
            service_id: service_id.into(),
            behavior: Behavior::ExpiredThenSucceed {
                url: url.into(),
                expired: AtomicBool::new(true),
            },
            seen_secrets: Mutex::new(Vec::new()),
        })
    }

    pub fn seen_secrets(&self) -> Vec<String> {
        self.seen_secrets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceUploader for MockBackend {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    async fn upload(
        &self,
        _file_path: &Path,
        credentials: &ServiceCredentials,
        _progress: &ProgressSender,
    ) -> Result<UploadedImage, UploadError> {
        self.seen_secrets
            .lock()
            .unwrap()
            .push(credentials.secret.clone());
        match &self.behavior {
            Behavior::Succeed { url } => Ok(UploadedImage {
                url: url.clone(),
                file_key: None,
            }),
            Behavior::Fail { error } => Err(error.clone()),
            Behavior::ExpiredThenSucceed { url, expired } => {
                if expired.swap(false, Ordering::SeqCst) {
                    Err(UploadError::cookie_expired("code 100006"))
                } else {
                    Ok(UploadedImage {
                        url: url.clone(),
                        file_key: None,
                    })
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MockClipboard {
    last: Mutex<Option<String>>,
}

impl MockClipboard {
    pub fn last(&self) -> Option<String> {
        self.last.lock().unwrap().clone()
    }
}

impl Clipboard for MockClipboard {
    fn write_text(&self, text: &str) -> anyhow::Result<()> {
        *self.last.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

enum StorageBehavior {
    Succeed,
    Fail,
    Hang,
}

pub struct MockStorage {
    behavior: StorageBehavior,
    keys: Mutex<Vec<String>>,
}

impl MockStorage {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            behavior: StorageBehavior::Succeed,
            keys: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            behavior: StorageBehavior::Fail,
            keys: Mutex::new(Vec::new()),
        })
    }

    /// Never completes; exercises the backup timeout.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            behavior: StorageBehavior::Hang,
            keys: Mutex::new(Vec::new()),
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn put(
        &self,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), UploadError> {
        match self.behavior {
            StorageBehavior::Succeed => {
                self.keys.lock().unwrap().push(key.to_string());
                Ok(())
            }
            StorageBehavior::Fail => Err(UploadError::server(500, "bucket unavailable")),
            StorageBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }
}

pub struct MockRefresher {
    cookie: String,
    calls: AtomicUsize,
}

impl MockRefresher {
    pub fn returning(cookie: &str) -> Arc<Self> {
        Arc::new(Self {
            cookie: cookie.into(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for MockRefresher {
    async fn relogin(&self, _account: &AccountCredentials) -> Result<String, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cookie.clone())
    }
}

#[derive(Default)]
pub struct MockSync {
    batches: Mutex<Vec<usize>>,
}

impl MockSync {
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySync for MockSync {
    async fn sync(&self, items: Vec<HistoryItem>, _config: WebDavConfig) {
        self.batches.lock().unwrap().push(items.len());
    }
}

pub fn webdav_config() -> WebDavConfig {
    WebDavConfig {
        url: "https://dav.example.com/remote.php/dav".into(),
        username: "alice".into(),
        password: "hunter2".into(),
        remote_path: "picrelay/".into(),
    }
}
