//! Upload flows: chunked image uploads and song ingestion.
//!
//! Chunk bookkeeping lives in [`UploadSessionRegistry`]; this service only
//! finalizes completed sessions and talks to storage and the catalog.

use super::{
    batch_tracker::BatchTracker,
    catalog::{self, NewSong},
    chunk_assembler::{decode_base64, sanitize_base64},
    content_store::{StorageProvider, content_key, content_type_for, extension_for},
    error::{LibraryError, LibraryResult},
    upload_registry::{AssembledUpload, ChunkOutcome, UploadSessionRegistry},
    url_cache::UrlSigningCache,
};
use crate::models::upload::{
    ActiveUpload, ArtworkPayload, BatchSummary, BatchUploadReport, ChunkRequest, ChunkResponse,
    CompletedUpload, FileResult, SongMetadata, UploadRole,
};
use bytes::Bytes;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// One audio file of a song batch, with the metadata the client sent for it.
#[derive(Debug, Clone)]
pub struct IncomingSong {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub metadata: SongMetadata,
}

#[derive(Clone)]
pub struct UploadService {
    db: Arc<SqlitePool>,
    store: Arc<dyn StorageProvider>,
    registry: Arc<UploadSessionRegistry>,
    urls: Arc<UrlSigningCache>,
    url_ttl: Duration,
    batches: Arc<BatchTracker>,
}

impl UploadService {
    pub fn new(
        db: Arc<SqlitePool>,
        store: Arc<dyn StorageProvider>,
        registry: Arc<UploadSessionRegistry>,
        urls: Arc<UrlSigningCache>,
        batches: Arc<BatchTracker>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            db,
            store,
            registry,
            urls,
            url_ttl,
            batches,
        }
    }

    /// Accept one chunk. The chunk that completes the upload also stores it
    /// and returns its URL.
    pub async fn submit_chunk(
        &self,
        request: ChunkRequest,
        user_id: &str,
    ) -> LibraryResult<ChunkResponse> {
        match self.registry.submit(request, user_id)? {
            ChunkOutcome::Pending { received, total } => Ok(ChunkResponse {
                done: false,
                received,
                total,
                progress_percent: progress_percent(received, total),
                url: None,
                key: None,
            }),
            ChunkOutcome::Complete(assembled) => {
                let total = assembled.buffer.total();
                let completed = self.finalize(assembled).await?;
                Ok(ChunkResponse {
                    done: true,
                    received: total,
                    total,
                    progress_percent: 100,
                    url: Some(completed.url),
                    key: Some(completed.key),
                })
            }
        }
    }

    /// Decode an assembled upload, store it under its content key and sign
    /// a URL for it.
    pub async fn finalize(&self, assembled: AssembledUpload) -> LibraryResult<CompletedUpload> {
        let AssembledUpload {
            upload_id,
            role,
            filename,
            mime_type,
            buffer,
            ..
        } = assembled;
        let data = buffer.assemble()?;
        if data.is_empty() {
            return Err(LibraryError::InvalidInput(format!(
                "upload {} decoded to zero bytes",
                upload_id
            )));
        }
        let extension = extension_for(filename.as_deref(), mime_type.as_deref())
            .unwrap_or_else(|| role.default_extension().to_string());
        let key = content_key(role.folder(), &data, &extension);
        let content_type = mime_type
            .as_deref()
            .unwrap_or_else(|| content_type_for(&extension))
            .to_string();
        let size = data.len();

        let locator = self.store.put(Bytes::from(data), &key, &content_type).await?;
        let url = self.urls.get_url(&key, self.url_ttl).await?;
        info!(upload_id = %upload_id, key = %key, size, "chunked upload stored");
        Ok(CompletedUpload {
            key,
            locator,
            url,
            role,
            size,
        })
    }

    /// Abandon a chunked upload.
    pub fn cancel_chunked(&self, upload_id: &str, user_id: &str) -> LibraryResult<()> {
        self.registry.cancel(upload_id, user_id)
    }

    /// Register a song batch so its progress can be polled.
    pub fn begin_batch(&self, username: &str, file_count: u32, total_size: u64) -> LibraryResult<String> {
        self.batches.begin(username, file_count, total_size)
    }

    pub fn batch_status(&self, upload_id: &str) -> Option<ActiveUpload> {
        self.batches.status(upload_id)
    }

    /// Store a base64 image for `role` and return its locator.
    pub async fn store_artwork(
        &self,
        artwork: &ArtworkPayload,
        role: UploadRole,
    ) -> LibraryResult<String> {
        let data = decode_base64(&sanitize_base64(&artwork.data))
            .map_err(|err| LibraryError::InvalidInput(format!("artwork is not base64: {}", err)))?;
        if data.is_empty() {
            return Err(LibraryError::InvalidInput("artwork is empty".into()));
        }
        let extension = extension_for(None, artwork.mime_type.as_deref())
            .unwrap_or_else(|| role.default_extension().to_string());
        let key = content_key(role.folder(), &data, &extension);
        let content_type = artwork
            .mime_type
            .as_deref()
            .unwrap_or_else(|| content_type_for(&extension))
            .to_string();
        Ok(self.store.put(Bytes::from(data), &key, &content_type).await?)
    }

    /// Ingest one song: reject duplicates, store audio and artwork, then
    /// write the catalog rows in one transaction.
    pub async fn process_file(&self, song: IncomingSong, user_id: &str) -> LibraryResult<i64> {
        let IncomingSong {
            filename,
            content_type,
            data,
            metadata,
        } = song;
        if data.is_empty() {
            return Err(LibraryError::InvalidInput(format!("{} is empty", filename)));
        }
        let mime_type = content_type.or_else(|| metadata.mime_type.clone());
        let extension = extension_for(Some(&filename), mime_type.as_deref())
            .unwrap_or_else(|| UploadRole::Song.default_extension().to_string());
        let key = content_key(UploadRole::Song.folder(), &data, &extension);
        let locator = self.store.locator_for(&key);

        {
            let mut conn = self.db.acquire().await?;
            if let Some(existing_song_id) = catalog::find_song_by_file_path(&mut conn, &locator).await? {
                debug!(filename = %filename, existing_song_id, "duplicate song upload");
                return Err(LibraryError::DuplicateFile { existing_song_id });
            }
        }

        let audio_type = mime_type
            .as_deref()
            .unwrap_or_else(|| content_type_for(&extension))
            .to_string();
        let stored = self.store.put(data, &key, &audio_type).await?;
        let cover_art = match &metadata.artwork {
            Some(artwork) => Some(self.store_artwork(artwork, UploadRole::SongArt).await?),
            None => None,
        };

        let song_id = self
            .write_catalog(&metadata, &filename, &stored, cover_art.as_deref(), user_id)
            .await?;
        info!(song_id, key = %key, user_id, "song uploaded");
        Ok(song_id)
    }

    async fn write_catalog(
        &self,
        metadata: &SongMetadata,
        filename: &str,
        file_path: &str,
        cover_art: Option<&str>,
        user_id: &str,
    ) -> LibraryResult<i64> {
        let artist_names = artist_names(&metadata.artists);
        let title = song_title(metadata, filename);

        let mut tx = self.db.begin().await?;
        let mut artist_ids = Vec::with_capacity(artist_names.len());
        for name in &artist_names {
            artist_ids.push(catalog::find_or_create_artist(&mut tx, name, user_id).await?);
        }
        let primary_artist = artist_ids[0];

        let album = match metadata.album.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(name) => Some(catalog::find_or_create_album(&mut tx, name, primary_artist, user_id).await?),
            None => None,
        };

        let song_id = catalog::insert_song(
            &mut tx,
            &NewSong {
                title: &title,
                album_id: album.as_ref().map(|a| a.id),
                file_path,
                cover_art,
                duration: metadata.duration,
                track_number: metadata.track_number,
                genre: metadata.genre.as_deref(),
                year: metadata.year,
                uploaded_by: user_id,
            },
        )
        .await?;
        for artist_id in &artist_ids {
            catalog::link_song_artist(&mut tx, song_id, *artist_id).await?;
        }
        if let (Some(album), Some(cover)) = (&album, cover_art) {
            if album.cover_art.is_none() {
                catalog::backfill_album_cover(&mut tx, album.id, cover).await?;
            }
        }
        tx.commit().await?;
        Ok(song_id)
    }

    /// Ingest every file independently. One file failing never stops the
    /// others; the report carries a result per file.
    pub async fn process_batch(
        &self,
        files: Vec<IncomingSong>,
        user_id: &str,
        upload_id: Option<&str>,
    ) -> BatchUploadReport {
        // A tracker owned by someone else is left alone.
        let tracked = upload_id.filter(|id| {
            let owned = self.batches.update(id, user_id, |_| {});
            if !owned {
                debug!(upload_id = %id, user_id, "batch names an unknown or foreign tracker");
            }
            owned
        });

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let filename = file.filename.clone();
            if let Some(id) = tracked {
                self.batches
                    .update(id, user_id, |entry| entry.current_file = Some(filename.clone()));
            }
            let result = match self.process_file(file, user_id).await {
                Ok(song_id) => FileResult {
                    filename,
                    success: true,
                    song_id: Some(song_id),
                    error: None,
                },
                Err(err) => {
                    warn!(filename = %filename, error = %err, "song upload failed");
                    FileResult {
                        filename,
                        success: false,
                        song_id: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            results.push(result);
            if let Some(id) = tracked {
                self.batches
                    .update(id, user_id, |entry| entry.processed_files += 1);
            }
        }
        if let Some(id) = tracked {
            self.batches.finish(id, user_id);
        }

        let successful = results.iter().filter(|r| r.success).count();
        BatchUploadReport {
            summary: BatchSummary {
                total: results.len(),
                successful,
                failed: results.len() - successful,
            },
            results,
        }
    }
}

fn progress_percent(received: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((u64::from(received) * 100) / u64::from(total)) as u32
}

/// Trimmed, de-duplicated artist names; never empty.
fn artist_names(declared: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in declared.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    if names.is_empty() {
        names.push(UNKNOWN_ARTIST.to_string());
    }
    names
}

fn song_title(metadata: &SongMetadata, filename: &str) -> String {
    metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
            if stem.trim().is_empty() {
                "Untitled".to_string()
            } else {
                stem.trim().to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_down() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn artists_default_and_dedupe() {
        assert_eq!(artist_names(&[]), vec![UNKNOWN_ARTIST.to_string()]);
        assert_eq!(
            artist_names(&[" X ".into(), "".into(), "Y".into(), "X".into()]),
            vec!["X".to_string(), "Y".to_string()]
        );
    }

    #[test]
    fn title_falls_back_to_filename_stem() {
        let mut metadata = SongMetadata::default();
        assert_eq!(song_title(&metadata, "intro.mp3"), "intro");
        assert_eq!(song_title(&metadata, ".mp3"), "Untitled");
        metadata.title = Some("  Z ".into());
        assert_eq!(song_title(&metadata, "intro.mp3"), "Z");
    }
}
