//! Content store wrappers for failure injection.

use async_trait::async_trait;
use bytes::Bytes;
use media_library::services::{
    content_store::{BatchDeleteReport, StorageError, StorageProvider, StorageResult},
    local_storage::LocalStorage,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Local storage that can be told to fail writes or deletes.
#[allow(dead_code)]
pub struct FlakyStore {
    pub inner: Arc<LocalStorage>,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: Arc<LocalStorage>) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProvider for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn put(&self, data: Bytes, key: &str, content_type: &str) -> StorageResult<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::S3("injected put failure".into()));
        }
        self.inner.put(data, key, content_type).await
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.inner.signed_url(key, ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::S3("injected delete failure".into()));
        }
        self.inner.delete(key).await
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<BatchDeleteReport> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::S3("injected delete failure".into()));
        }
        self.inner.delete_batch(keys).await
    }

    fn locator_for(&self, key: &str) -> String {
        self.inner.locator_for(key)
    }

    fn key_for_locator(&self, locator: &str) -> Option<String> {
        self.inner.key_for_locator(locator)
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
