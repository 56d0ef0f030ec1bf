use chrono::Utc;
use picrelay_core::EncryptionService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};

/// Well-known key of the upload history array.
pub const HISTORY_KEY: &str = "uploads";

/// The history array is newest-first; anything past this count is dropped
/// on every persisted write.
pub const MAX_HISTORY_ENTRIES: usize = 500;

/// A single-file encrypted JSON document.
///
/// The whole read-modify-write of a `set` runs under one async lock, so
/// writes to the same key are strictly serialized and cross-key writers
/// cannot interleave on the underlying file. Writes go to a sibling `.tmp`
/// file followed by an atomic rename.
pub struct EncryptedStore {
    path: PathBuf,
    cipher: EncryptionService,
    doc_lock: Mutex<()>,
}

enum LoadedDocument {
    Missing,
    Ok(Map<String, Value>),
    Corrupt { reason: String },
}

impl EncryptedStore {
    /// Open (or create the parent directory for) a store file.
    pub async fn open(path: impl Into<PathBuf>, cipher: EncryptionService) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Init {
                    path: path.display().to_string(),
                    source,
                })?;
        }
        Ok(Self {
            path,
            cipher,
            doc_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value. `Ok(None)` when the file or key does not exist; a
    /// corrupt document is a read error (use [`get_or_default`] to recover).
    ///
    /// [`get_or_default`]: EncryptedStore::get_or_default
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let _guard = self.doc_lock.lock().await;
        match self.load_document().await? {
            LoadedDocument::Missing => Ok(None),
            LoadedDocument::Corrupt { reason } => Err(StoreError::Read {
                key: key.to_string(),
                message: reason,
            }),
            LoadedDocument::Ok(doc) => match doc.get(key) {
                None => Ok(None),
                Some(value) => {
                    serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                        StoreError::Read {
                            key: key.to_string(),
                            message: format!("Stored value has unexpected shape: {}", e),
                        }
                    })
                }
            },
        }
    }

    /// Read a value, substituting `default` when the key is absent.
    ///
    /// A corrupt document is recovered in place: the damaged file is copied
    /// to `<path>.corrupted.<unixts>`, `default` is persisted under `key`,
    /// and `default` is returned.
    pub async fn get_or_default<T>(&self, key: &str, default: T) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.doc_lock.lock().await;
        let doc = match self.load_document().await? {
            LoadedDocument::Missing => return Ok(default),
            LoadedDocument::Corrupt { reason } => {
                let backup = self.backup_corrupt_file(key, &reason).await?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    key,
                    reason,
                    "Store document corrupt, recovered with default value"
                );
                let mut fresh = Map::new();
                fresh.insert(
                    key.to_string(),
                    serde_json::to_value(&default).map_err(|e| StoreError::Write {
                        key: key.to_string(),
                        message: e.to_string(),
                    })?,
                );
                self.persist_document(key, fresh).await?;
                return Ok(default);
            }
            LoadedDocument::Ok(doc) => doc,
        };

        match doc.get(key) {
            None => Ok(default),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| StoreError::Read {
                    key: key.to_string(),
                    message: format!("Stored value has unexpected shape: {}", e),
                })
            }
        }
    }

    /// Write a value under `key` (whole-document read-modify-write).
    ///
    /// Writing an array longer than [`MAX_HISTORY_ENTRIES`] to
    /// [`HISTORY_KEY`] persists only its first entries.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let _guard = self.doc_lock.lock().await;

        let mut doc = match self.load_document().await? {
            LoadedDocument::Missing => Map::new(),
            LoadedDocument::Ok(doc) => doc,
            LoadedDocument::Corrupt { reason } => {
                // A corrupt document must not block new writes; keep the
                // damaged bytes around and start over.
                let backup = self.backup_corrupt_file(key, &reason).await?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    reason,
                    "Store document corrupt, starting a fresh document"
                );
                Map::new()
            }
        };

        let mut json = serde_json::to_value(value).map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        cap_history(key, &mut json);

        doc.insert(key.to_string(), json);
        self.persist_document(key, doc).await
    }

    /// Read-modify-write one key without releasing the document lock in
    /// between. The closure sees the stored value (or `default` when the
    /// file or key is absent) and its result is persisted. Concurrent
    /// `update`s of the same key therefore never lose each other's writes.
    ///
    /// A corrupt document is backed up and replaced, like [`set`]; the
    /// history cap applies. Returns the value as persisted.
    ///
    /// [`set`]: EncryptedStore::set
    pub async fn update<T>(&self, key: &str, default: T, f: impl FnOnce(&mut T)) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.doc_lock.lock().await;

        let mut doc = match self.load_document().await? {
            LoadedDocument::Missing => Map::new(),
            LoadedDocument::Ok(doc) => doc,
            LoadedDocument::Corrupt { reason } => {
                let backup = self.backup_corrupt_file(key, &reason).await?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    reason,
                    "Store document corrupt, starting a fresh document"
                );
                Map::new()
            }
        };

        let mut value: T = match doc.get(key) {
            None => default,
            Some(stored) => {
                serde_json::from_value(stored.clone()).map_err(|e| StoreError::Read {
                    key: key.to_string(),
                    message: format!("Stored value has unexpected shape: {}", e),
                })?
            }
        };
        f(&mut value);

        let mut json = serde_json::to_value(&value).map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        cap_history(key, &mut json);

        let persisted: T = serde_json::from_value(json.clone()).map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        doc.insert(key.to_string(), json);
        self.persist_document(key, doc).await?;
        Ok(persisted)
    }

    /// Remove one key from the document.
    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        let _guard = self.doc_lock.lock().await;
        let mut doc = match self.load_document().await? {
            LoadedDocument::Ok(doc) => doc,
            _ => return Ok(()),
        };
        if doc.remove(key).is_some() {
            self.persist_document(key, doc).await?;
        }
        Ok(())
    }

    /// Reset the document to an empty object.
    pub async fn clear(&self) -> StoreResult<()> {
        let _guard = self.doc_lock.lock().await;
        self.persist_document("", Map::new())
            .await
            .map_err(|e| StoreError::Clear {
                message: e.to_string(),
            })
    }

    async fn load_document(&self) -> StoreResult<LoadedDocument> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedDocument::Missing)
            }
            Err(e) => {
                return Err(StoreError::Read {
                    key: String::new(),
                    message: format!("Failed to read {}: {}", self.path.display(), e),
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(LoadedDocument::Missing);
        }

        // Legacy plaintext documents were written before encryption was
        // introduced; JSON-looking content is parsed directly.
        let trimmed = raw.trim_start();
        let plaintext = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            raw.clone()
        } else {
            match self.cipher.decrypt(&raw) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    return Ok(LoadedDocument::Corrupt {
                        reason: format!("Decryption failed: {}", e),
                    })
                }
            }
        };

        match serde_json::from_str::<Value>(&plaintext) {
            Ok(Value::Object(doc)) => Ok(LoadedDocument::Ok(doc)),
            Ok(_) => Ok(LoadedDocument::Corrupt {
                reason: "Document top level is not an object".to_string(),
            }),
            Err(e) => Ok(LoadedDocument::Corrupt {
                reason: format!("JSON parse failed: {}", e),
            }),
        }
    }

    async fn persist_document(&self, key: &str, doc: Map<String, Value>) -> StoreResult<()> {
        let write_err = |message: String| StoreError::Write {
            key: key.to_string(),
            message,
        };

        let plaintext =
            serde_json::to_string(&Value::Object(doc)).map_err(|e| write_err(e.to_string()))?;
        let ciphertext = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| write_err(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, ciphertext.as_bytes())
            .await
            .map_err(|e| write_err(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_err(format!("Failed to replace {}: {}", self.path.display(), e)))
    }

    async fn backup_corrupt_file(&self, key: &str, reason: &str) -> StoreResult<PathBuf> {
        let backup = PathBuf::from(format!(
            "{}.corrupted.{}",
            self.path.display(),
            Utc::now().timestamp()
        ));
        fs::copy(&self.path, &backup)
            .await
            .map_err(|e| StoreError::Read {
                key: key.to_string(),
                message: format!("{} (backup of corrupt file failed: {})", reason, e),
            })?;
        Ok(backup)
    }
}

fn cap_history(key: &str, json: &mut Value) {
    if key != HISTORY_KEY {
        return;
    }
    if let Value::Array(items) = json {
        if items.len() > MAX_HISTORY_ENTRIES {
            tracing::debug!(
                dropped = items.len() - MAX_HISTORY_ENTRIES,
                "History over cap, dropping oldest entries"
            );
            items.truncate(MAX_HISTORY_ENTRIES);
        }
    }
}
