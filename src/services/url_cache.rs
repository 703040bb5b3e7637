//! Memoizes signed URLs per `(key, ttl)` for a short window.
//!
//! Entries live for `cache_duration`, which must stay below the TTL callers
//! ask for so a cached URL is never close to its own expiry. Requests with a
//! TTL at or below the cache duration bypass the cache.

use super::{
    clock::Clock,
    content_store::{StorageProvider, StorageResult},
    sweeper::{Sweep, Sweeper},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    expires_at: DateTime<Utc>,
}

pub struct UrlSigningCache {
    store: Arc<dyn StorageProvider>,
    cache_duration: Duration,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, CachedUrl>,
    sweeper: Sweeper,
}

impl UrlSigningCache {
    pub fn new(
        store: Arc<dyn StorageProvider>,
        cache_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache_duration,
            clock,
            entries: DashMap::new(),
            sweeper: Sweeper::default(),
        }
    }

    /// Signed URL for `key`, reused while the cached entry is fresh.
    pub async fn get_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let cache_key = format!("{}_{}", key, ttl.as_secs());
        let now = self.clock.now();
        let cached = self
            .entries
            .get(&cache_key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.url.clone());
        if let Some(url) = cached {
            return Ok(url);
        }

        let url = self.store.signed_url(key, ttl).await?;
        let lifetime = chrono::Duration::from_std(self.cache_duration).ok();
        match lifetime {
            Some(lifetime) if ttl > self.cache_duration => {
                self.entries.insert(
                    cache_key,
                    CachedUrl {
                        url: url.clone(),
                        expires_at: now + lifetime,
                    },
                );
            }
            _ => {}
        }
        Ok(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(self: &Arc<Self>, interval: Duration) {
        self.sweeper.start("url_cache", Arc::clone(self), interval);
    }

    pub async fn stop(&self) {
        self.sweeper.stop().await;
    }
}

impl Sweep for UrlSigningCache {
    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| now >= entry.value().expires_at)
            .map(|entry| entry.key().clone())
            .collect();
        stale
            .into_iter()
            .filter(|key| {
                self.entries
                    .remove_if(key, |_, entry| now >= entry.expires_at)
                    .is_some()
            })
            .count()
    }
}
