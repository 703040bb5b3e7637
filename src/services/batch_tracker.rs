//! Progress trackers for song batches announced through `/uploads/init`.
//!
//! A tracker is removed when its batch finishes. Trackers whose batch never
//! arrives are evicted by the sweep once older than `max_age`.

use super::{
    clock::Clock,
    error::{LibraryError, LibraryResult},
    sweeper::{Sweep, Sweeper},
};
use crate::models::upload::ActiveUpload;
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

pub struct BatchTracker {
    entries: DashMap<String, ActiveUpload>,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    sweeper: Sweeper,
}

impl BatchTracker {
    pub fn new(max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
            clock,
            sweeper: Sweeper::default(),
        }
    }

    /// Register a batch for `username` and return its upload id.
    pub fn begin(&self, username: &str, file_count: u32, total_size: u64) -> LibraryResult<String> {
        if file_count == 0 {
            return Err(LibraryError::InvalidInput("fileCount must be at least 1".into()));
        }
        let upload_id = Uuid::new_v4().to_string();
        self.entries.insert(
            upload_id.clone(),
            ActiveUpload {
                upload_id: upload_id.clone(),
                username: username.to_string(),
                total_files: file_count,
                total_size,
                processed_files: 0,
                current_file: None,
                start_time: self.clock.now(),
            },
        );
        Ok(upload_id)
    }

    pub fn status(&self, upload_id: &str) -> Option<ActiveUpload> {
        self.entries.get(upload_id).map(|entry| entry.value().clone())
    }

    /// Apply `update` to the tracker if it belongs to `user_id`.
    pub fn update(&self, upload_id: &str, user_id: &str, update: impl FnOnce(&mut ActiveUpload)) -> bool {
        match self.entries.get_mut(upload_id) {
            Some(mut entry) if entry.username == user_id => {
                update(entry.value_mut());
                true
            }
            _ => false,
        }
    }

    /// Drop the tracker if it belongs to `user_id`.
    pub fn finish(&self, upload_id: &str, user_id: &str) -> bool {
        self.entries
            .remove_if(upload_id, |_, entry| entry.username == user_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start(self: &Arc<Self>, interval: Duration) {
        self.sweeper.start("batch_trackers", Arc::clone(self), interval);
    }

    pub async fn stop(&self) {
        self.sweeper.stop().await;
    }
}

impl Sweep for BatchTracker {
    fn sweep(&self) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(self.max_age) else {
            return 0;
        };
        let cutoff = self.clock.now() - max_age;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().start_time < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        let evicted = stale
            .into_iter()
            .filter(|id| {
                self.entries
                    .remove_if(id, |_, entry| entry.start_time < cutoff)
                    .is_some()
            })
            .count();
        if evicted > 0 {
            debug!(evicted, "dropped abandoned batch trackers");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;

    fn tracker() -> (BatchTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (BatchTracker::new(Duration::from_secs(3600), clock.clone()), clock)
    }

    #[test]
    fn abandoned_trackers_are_swept() {
        let (tracker, clock) = tracker();
        for _ in 0..1000 {
            tracker.begin("alice", 2, 2048).unwrap();
        }
        clock.advance(chrono::Duration::minutes(30));
        let fresh = tracker.begin("alice", 1, 10).unwrap();
        assert_eq!(tracker.sweep(), 0);

        clock.advance(chrono::Duration::days(30));
        assert_eq!(tracker.sweep(), 1001);
        assert!(tracker.is_empty());
        assert!(tracker.status(&fresh).is_none());
    }

    #[test]
    fn sweep_keeps_recent_trackers() {
        let (tracker, clock) = tracker();
        let old = tracker.begin("alice", 1, 10).unwrap();
        clock.advance(chrono::Duration::minutes(50));
        let recent = tracker.begin("alice", 1, 10).unwrap();
        clock.advance(chrono::Duration::minutes(20));

        assert_eq!(tracker.sweep(), 1);
        assert!(tracker.status(&old).is_none());
        assert!(tracker.status(&recent).is_some());
    }

    #[test]
    fn only_the_owner_updates_or_finishes() {
        let (tracker, _) = tracker();
        let id = tracker.begin("alice", 3, 10).unwrap();

        assert!(!tracker.update(&id, "bob", |entry| entry.processed_files = 3));
        assert!(!tracker.finish(&id, "bob"));
        assert_eq!(tracker.status(&id).unwrap().processed_files, 0);

        assert!(tracker.update(&id, "alice", |entry| entry.processed_files += 1));
        assert_eq!(tracker.status(&id).unwrap().processed_files, 1);
        assert!(tracker.finish(&id, "alice"));
        assert!(tracker.status(&id).is_none());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let (tracker, _) = tracker();
        assert!(matches!(
            tracker.begin("alice", 0, 0),
            Err(LibraryError::InvalidInput(_))
        ));
    }
}
