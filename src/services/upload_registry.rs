//! In-memory registry of in-flight chunked uploads.
//!
//! Sessions are keyed by upload id and live only in this process. A restart
//! drops every session, and several instances behind a load balancer need
//! sticky routing so that all chunks of one upload reach the same registry.
//!
//! Ids of sessions that completed, were cancelled or were evicted are kept
//! for `max_age` so late or replayed chunks for them fail instead of opening
//! a session that could never complete.

use super::{
    chunk_assembler::{ChunkBuffer, sanitize_base64},
    clock::Clock,
    error::{LibraryError, LibraryResult},
    sweeper::{Sweep, Sweeper},
};
use crate::models::upload::{ChunkRequest, UploadRole};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::{debug, warn};

/// Bounds on the registry.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_sessions: usize,
    /// Sessions older than this are evicted by the sweep.
    pub max_age: Duration,
    /// Largest accepted chunk payload, in base64 characters.
    pub max_chunk_len: usize,
    /// How many closed upload ids are remembered at most.
    pub max_closed: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_age: Duration::from_secs(30 * 60),
            max_chunk_len: 2 * 1024 * 1024,
            max_closed: 10_000,
        }
    }
}

#[derive(Debug)]
struct UploadSession {
    user_id: String,
    role: UploadRole,
    filename: Option<String>,
    mime_type: Option<String>,
    buffer: ChunkBuffer,
    created_at: DateTime<Utc>,
}

/// A session whose every chunk has arrived. Removed from the registry.
#[derive(Debug)]
pub struct AssembledUpload {
    pub upload_id: String,
    pub user_id: String,
    pub role: UploadRole,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub buffer: ChunkBuffer,
}

#[derive(Debug, Default)]
struct Sessions {
    live: HashMap<String, UploadSession>,
    /// Closed upload ids and when they closed.
    closed: HashMap<String, DateTime<Utc>>,
}

impl Sessions {
    fn close(&mut self, upload_id: String, at: DateTime<Utc>, max_closed: usize) {
        self.closed.insert(upload_id, at);
        while self.closed.len() > max_closed {
            let Some(oldest) = self
                .closed
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.closed.remove(&oldest);
        }
    }

    /// Remove a live session, release its buffer and remember its id.
    fn discard(&mut self, upload_id: &str, at: DateTime<Utc>, max_closed: usize) -> Option<usize> {
        let mut session = self.live.remove(upload_id)?;
        let buffered = session.buffer.buffered_bytes();
        session.buffer.release();
        self.close(upload_id.to_string(), at, max_closed);
        Some(buffered)
    }
}

#[derive(Debug)]
pub enum ChunkOutcome {
    Pending { received: u32, total: u32 },
    Complete(AssembledUpload),
}

pub struct UploadSessionRegistry {
    sessions: Mutex<Sessions>,
    limits: SessionLimits,
    clock: Arc<dyn Clock>,
    sweeper: Sweeper,
}

impl UploadSessionRegistry {
    pub fn new(limits: SessionLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            limits,
            clock,
            sweeper: Sweeper::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one chunk for `user_id`.
    ///
    /// The first chunk seen for a new upload id opens the session, whatever
    /// its index. Later chunks must come from the same user and declare the
    /// same chunk count. A repeated index is ignored. Chunks for a closed
    /// upload id are rejected.
    pub fn submit(&self, request: ChunkRequest, user_id: &str) -> LibraryResult<ChunkOutcome> {
        if request.upload_id.trim().is_empty() {
            return Err(LibraryError::InvalidInput("uploadId is required".into()));
        }
        if request.chunk.len() > self.limits.max_chunk_len {
            return Err(LibraryError::InvalidInput(format!(
                "chunk of {} characters exceeds limit of {}",
                request.chunk.len(),
                self.limits.max_chunk_len
            )));
        }
        let payload = sanitize_base64(&request.chunk);
        let now = self.clock.now();

        let mut sessions = self.lock();
        if sessions.closed.contains_key(&request.upload_id) {
            return Err(LibraryError::InvalidSession(format!(
                "upload {} is no longer open",
                request.upload_id
            )));
        }
        let complete = match sessions.live.get_mut(&request.upload_id) {
            Some(session) => {
                if session.user_id != user_id {
                    return Err(LibraryError::InvalidSession(format!(
                        "upload {} belongs to another user",
                        request.upload_id
                    )));
                }
                if session.buffer.total() != request.total_chunks {
                    return Err(LibraryError::InvalidSession(format!(
                        "totalChunks changed from {} to {}",
                        session.buffer.total(),
                        request.total_chunks
                    )));
                }
                if !session.buffer.insert(request.chunk_index, payload)? {
                    debug!(
                        upload_id = %request.upload_id,
                        chunk = request.chunk_index,
                        "ignoring repeated chunk"
                    );
                }
                session.buffer.is_complete()
            }
            None => {
                let role = request.role.unwrap_or_default();
                if !role.is_image() {
                    return Err(LibraryError::InvalidInput(format!(
                        "role `{}` cannot be uploaded in chunks",
                        role
                    )));
                }
                let mut buffer = ChunkBuffer::new(request.total_chunks)?;
                buffer.insert(request.chunk_index, payload)?;
                let complete = buffer.is_complete();
                sessions.live.insert(
                    request.upload_id.clone(),
                    UploadSession {
                        user_id: user_id.to_string(),
                        role,
                        filename: request.filename.clone(),
                        mime_type: request.mime_type.clone(),
                        buffer,
                        created_at: now,
                    },
                );
                debug!(upload_id = %request.upload_id, role = %role, "opened upload session");
                if !complete {
                    self.evict_over_capacity(&mut sessions, now);
                }
                complete
            }
        };

        if complete {
            let session = sessions
                .live
                .remove(&request.upload_id)
                .ok_or_else(|| LibraryError::Fatal("completed session vanished".into()))?;
            sessions.close(request.upload_id.clone(), now, self.limits.max_closed);
            return Ok(ChunkOutcome::Complete(AssembledUpload {
                upload_id: request.upload_id,
                user_id: session.user_id,
                role: session.role,
                filename: session.filename,
                mime_type: session.mime_type,
                buffer: session.buffer,
            }));
        }

        match sessions.live.get(&request.upload_id) {
            Some(session) => Ok(ChunkOutcome::Pending {
                received: session.buffer.received(),
                total: session.buffer.total(),
            }),
            // Evicted straight away because the registry is full of newer sessions.
            None => Err(LibraryError::InvalidSession(format!(
                "upload {} was evicted",
                request.upload_id
            ))),
        }
    }

    /// Discard a session and its buffered chunks.
    pub fn cancel(&self, upload_id: &str, user_id: &str) -> LibraryResult<()> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        match sessions.live.get(upload_id) {
            None => Err(LibraryError::InvalidSession(format!(
                "unknown upload {}",
                upload_id
            ))),
            Some(session) if session.user_id != user_id => Err(LibraryError::InvalidSession(
                format!("upload {} belongs to another user", upload_id),
            )),
            Some(_) => {
                sessions.discard(upload_id, now, self.limits.max_closed);
                debug!(upload_id, "cancelled upload session");
                Ok(())
            }
        }
    }

    /// `(received, total)` for a live session.
    pub fn progress(&self, upload_id: &str) -> Option<(u32, u32)> {
        self.lock()
            .live
            .get(upload_id)
            .map(|s| (s.buffer.received(), s.buffer.total()))
    }

    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every session older than the configured max age and forget
    /// closed ids older than it. Returns the number of evicted sessions.
    pub fn sweep_expired(&self) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(self.limits.max_age) else {
            return 0;
        };
        let now = self.clock.now();
        let cutoff = now - max_age;
        let mut sessions = self.lock();
        sessions.closed.retain(|_, closed_at| *closed_at >= cutoff);
        let expired: Vec<String> = sessions
            .live
            .iter()
            .filter(|(_, s)| s.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.discard(id, now, self.limits.max_closed);
        }
        expired.len()
    }

    /// Drop oldest sessions until the registry is within `max_sessions`.
    fn evict_over_capacity(&self, sessions: &mut Sessions, now: DateTime<Utc>) {
        while sessions.live.len() > self.limits.max_sessions {
            let Some(oldest) = sessions
                .live
                .iter()
                .min_by_key(|(_, s)| s.created_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            if let Some(buffered_bytes) = sessions.discard(&oldest, now, self.limits.max_closed) {
                warn!(
                    upload_id = %oldest,
                    buffered_bytes,
                    "evicted upload session over capacity"
                );
            }
        }
    }

    /// Number of closed upload ids currently remembered.
    pub fn closed_len(&self) -> usize {
        self.lock().closed.len()
    }

    /// Start the periodic TTL sweep.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        self.sweeper
            .start("upload_sessions", Arc::clone(self), interval);
    }

    /// Stop the periodic TTL sweep.
    pub async fn stop(&self) {
        self.sweeper.stop().await;
    }
}

impl Sweep for UploadSessionRegistry {
    fn sweep(&self) -> usize {
        self.sweep_expired()
    }
}
