//! Content Store: key-addressed blob storage behind one trait.
//!
//! Two providers implement it, [`LocalStorage`](super::local_storage::LocalStorage)
//! and [`S3Storage`](super::s3_storage::S3Storage). One provider is built at
//! start-up and shared as `Arc<dyn StorageProvider>`.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::{io, time::Duration};
use thiserror::Error;

/// Largest number of keys sent in one batch delete call (S3 limit).
pub const DELETE_BATCH_SIZE: usize = 1000;

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("storage configuration error: {0}")]
    Config(String),
    #[error("url signing failed: {0}")]
    Signing(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a multi-key delete. Failed keys are reported, not raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub deleted: usize,
    pub failed: Vec<String>,
}

impl BatchDeleteReport {
    pub fn merge(&mut self, other: BatchDeleteReport) {
        self.deleted += other.deleted;
        self.failed.extend(other.failed);
    }
}

#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Store `data` under `key` and return its locator.
    async fn put(&self, data: Bytes, key: &str, content_type: &str) -> StorageResult<String>;

    /// Time-limited URL for reading `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Remove one object. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Remove one batch of at most [`DELETE_BATCH_SIZE`] keys.
    async fn delete_batch(&self, keys: &[String]) -> StorageResult<BatchDeleteReport>;

    /// The locator `put` would return for `key`.
    fn locator_for(&self, key: &str) -> String;

    /// Inverse of [`locator_for`](Self::locator_for). `None` when the locator
    /// does not belong to this store.
    fn key_for_locator(&self, locator: &str) -> Option<String>;

    /// Cheap write/read/delete probe used by `/readyz`.
    async fn health_check(&self) -> StorageResult<()>;

    /// Remove many objects, batch by batch, in order.
    ///
    /// A failing batch marks all of its keys failed; later batches still run.
    async fn delete_many(&self, keys: &[String]) -> BatchDeleteReport {
        let mut report = BatchDeleteReport::default();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            match self.delete_batch(batch).await {
                Ok(batch_report) => report.merge(batch_report),
                Err(err) => {
                    tracing::warn!(
                        backend = self.name(),
                        keys = batch.len(),
                        error = %err,
                        "batch delete failed"
                    );
                    report.failed.extend(batch.iter().cloned());
                }
            }
        }
        report
    }
}

/// Reject keys that could escape the storage root or confuse a backend.
pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Content-addressed key: `{folder}/{sha256}.{ext}`.
pub fn content_key(folder: &str, data: &[u8], extension: &str) -> String {
    format!("{}/{}.{}", folder, sha256_hex(data), extension)
}

/// Pick a file extension from the filename, then the MIME type.
pub fn extension_for(filename: Option<&str>, mime_type: Option<&str>) -> Option<String> {
    let from_name = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.bytes().all(|b| b.is_ascii_alphanumeric()));
    from_name.or_else(|| {
        let ext = match mime_type?.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/flac" | "audio/x-flac" => "flac",
            "audio/ogg" => "ogg",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/mp4" | "audio/x-m4a" | "audio/aac" => "m4a",
            _ => return None,
        };
        Some(ext.to_string())
    })
}

/// Content type for an extension, used when the client declared none.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
