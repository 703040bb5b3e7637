//! Application state shared across handlers.

use crate::services::{
    content_store::StorageProvider, deletion_service::DeletionService, local_storage::LocalStorage,
    upload_service::UploadService, url_cache::UrlSigningCache,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub store: Arc<dyn StorageProvider>,
    /// Set when blobs live on local disk and `/media` serves them.
    pub local: Option<Arc<LocalStorage>>,
    pub uploads: UploadService,
    pub deletions: DeletionService,
    pub urls: Arc<UrlSigningCache>,
    /// TTL used when a client asks for a URL without naming one.
    pub default_url_ttl: Duration,
}
