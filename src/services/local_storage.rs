//! Local-disk Content Store.
//!
//! Objects live at `base_path/{key}`. Writes go to a temp file in the target
//! directory, are fsynced, then renamed into place. Signed URLs point at the
//! `/media/{key}` route and carry an HMAC-SHA256 over `key:expires`.

use super::content_store::{
    BatchDeleteReport, StorageError, StorageProvider, StorageResult, ensure_key_safe,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    /// Public origin the `/media` route is served from, without trailing slash.
    public_base_url: String,
    signing_secret: Vec<u8>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("base_path", &self.base_path)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl LocalStorage {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.as_ref().to_vec(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Filesystem path for a validated key.
    pub fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        ensure_key_safe(key)?;
        Ok(self.base_path.join(key))
    }

    fn signature(&self, key: &str, expires: i64) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)
            .map_err(|err| StorageError::Signing(err.to_string()))?;
        mac.update(format!("{}:{}", key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a `/media` request's `expires` and `signature` query values.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.signing_secret) else {
            return false;
        };
        mac.update(format!("{}:{}", key, expires).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, data: Bytes, key: &str, _content_type: &str) -> StorageResult<String> {
        let file_path = self.object_path(key)?;
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let write = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await
        };
        if let Err(err) = write.await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!(key, bytes = data.len(), "stored object on disk");
        Ok(self.locator_for(key))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        ensure_key_safe(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signature(key, expires)?;
        Ok(format!(
            "{}?expires={}&signature={}",
            self.locator_for(key),
            expires,
            signature
        ))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let file_path = self.object_path(key)?;
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<BatchDeleteReport> {
        let mut report = BatchDeleteReport::default();
        for key in keys {
            match self.delete(key).await {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    debug!(key = %key, error = %err, "failed to delete object");
                    report.failed.push(key.clone());
                }
            }
        }
        Ok(report)
    }

    fn locator_for(&self, key: &str) -> String {
        format!("{}/media/{}", self.public_base_url, key)
    }

    fn key_for_locator(&self, locator: &str) -> Option<String> {
        let prefix = format!("{}/media/", self.public_base_url);
        let key = locator.strip_prefix(&prefix)?;
        let key = key.split('?').next().unwrap_or(key);
        ensure_key_safe(key).ok()?;
        Some(key.to_string())
    }

    async fn health_check(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::other("file content mismatch")));
        }
        Ok(())
    }
}
