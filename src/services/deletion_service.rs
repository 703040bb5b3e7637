//! Cascading deletion of songs, albums and artists.
//!
//! All catalog changes for one request happen in a single transaction:
//! dependent rows first, then the target, then an orphan sweep of albums
//! without songs and artists without songs or albums. Blob keys referenced
//! by the removed rows are collected on the way and deleted only after the
//! commit. Blob cleanup is best-effort; a storage failure is logged and the
//! catalog change stands.

use super::{
    catalog,
    content_store::StorageProvider,
    error::{LibraryError, LibraryResult},
};
use crate::models::catalog::Song;
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, info, warn};

/// Who is asking for a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// Admins may delete anything; other users only what contains a song
    /// they uploaded.
    fn may_delete(&self, songs: &[Song]) -> bool {
        self.is_admin || songs.iter().any(|s| s.uploaded_by == self.user_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSongOutcome {
    pub deleted_files: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAlbumOutcome {
    pub songs_deleted: usize,
    pub deleted_files: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteArtistOutcome {
    pub songs_deleted: usize,
    pub albums_deleted: usize,
    pub deleted_files: usize,
}

/// What one transaction removed, plus the blob locators it released.
#[derive(Debug, Default)]
struct Removal {
    songs: usize,
    albums: usize,
    locators: BTreeSet<String>,
}

impl Removal {
    fn release(&mut self, locator: Option<&str>) {
        if let Some(locator) = locator.filter(|l| !l.is_empty()) {
            self.locators.insert(locator.to_string());
        }
    }

    fn release_songs(&mut self, songs: &[Song]) {
        for song in songs {
            self.release(Some(&song.file_path));
            self.release(song.cover_art.as_deref());
        }
    }
}

#[derive(Clone)]
pub struct DeletionService {
    db: Arc<SqlitePool>,
    store: Arc<dyn StorageProvider>,
}

impl DeletionService {
    pub fn new(db: Arc<SqlitePool>, store: Arc<dyn StorageProvider>) -> Self {
        Self { db, store }
    }

    pub async fn delete_song(&self, song_id: i64, actor: &Actor) -> LibraryResult<DeleteSongOutcome> {
        let mut tx = self.db.begin().await?;
        let result = Self::remove_song(&mut tx, song_id, actor).await;
        let keys = self.settle(tx, result).await?;
        let deleted_files = self.delete_blobs(&keys).await;
        info!(song_id, user_id = %actor.user_id, deleted_files, "song deleted");
        Ok(DeleteSongOutcome { deleted_files })
    }

    pub async fn delete_album(
        &self,
        album_id: i64,
        actor: &Actor,
    ) -> LibraryResult<DeleteAlbumOutcome> {
        let mut tx = self.db.begin().await?;
        let result = Self::remove_album(&mut tx, album_id, actor).await;
        let songs_deleted = result.as_ref().map(|r| r.songs).unwrap_or_default();
        let keys = self.settle(tx, result).await?;
        let deleted_files = self.delete_blobs(&keys).await;
        info!(album_id, user_id = %actor.user_id, songs_deleted, deleted_files, "album deleted");
        Ok(DeleteAlbumOutcome {
            songs_deleted,
            deleted_files,
        })
    }

    pub async fn delete_artist(
        &self,
        artist_id: i64,
        actor: &Actor,
    ) -> LibraryResult<DeleteArtistOutcome> {
        let mut tx = self.db.begin().await?;
        let result = Self::remove_artist(&mut tx, artist_id, actor).await;
        let counts = result.as_ref().map(|r| (r.songs, r.albums)).unwrap_or_default();
        let keys = self.settle(tx, result).await?;
        let deleted_files = self.delete_blobs(&keys).await;
        info!(
            artist_id,
            user_id = %actor.user_id,
            songs_deleted = counts.0,
            albums_deleted = counts.1,
            deleted_files,
            "artist deleted"
        );
        Ok(DeleteArtistOutcome {
            songs_deleted: counts.0,
            albums_deleted: counts.1,
            deleted_files,
        })
    }

    async fn remove_song(
        conn: &mut SqliteConnection,
        song_id: i64,
        actor: &Actor,
    ) -> LibraryResult<Removal> {
        let song = catalog::fetch_song(&mut *conn, song_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound(format!("song {}", song_id)))?;
        let songs = [song];
        if !actor.may_delete(&songs) {
            return Err(LibraryError::Unauthorized(format!(
                "song {} was uploaded by another user",
                song_id
            )));
        }

        let mut removal = Removal::default();
        removal.release_songs(&songs);
        removal.songs = catalog::delete_songs(&mut *conn, &[song_id]).await? as usize;
        Self::sweep_orphans(&mut *conn, &mut removal).await?;
        Ok(removal)
    }

    async fn remove_album(
        conn: &mut SqliteConnection,
        album_id: i64,
        actor: &Actor,
    ) -> LibraryResult<Removal> {
        let album = catalog::fetch_album(&mut *conn, album_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound(format!("album {}", album_id)))?;
        let songs = catalog::songs_in_album(&mut *conn, album_id).await?;
        if !actor.may_delete(&songs) {
            return Err(LibraryError::Unauthorized(format!(
                "album {} has no songs uploaded by {}",
                album_id, actor.user_id
            )));
        }

        let mut removal = Removal::default();
        removal.release_songs(&songs);
        removal.release(album.cover_art.as_deref());
        let song_ids: Vec<i64> = songs.iter().map(|s| s.id).collect();
        removal.songs = catalog::delete_songs(&mut *conn, &song_ids).await? as usize;
        removal.albums = catalog::delete_albums(&mut *conn, &[album_id]).await? as usize;
        Self::sweep_orphans(&mut *conn, &mut removal).await?;
        Ok(removal)
    }

    async fn remove_artist(
        conn: &mut SqliteConnection,
        artist_id: i64,
        actor: &Actor,
    ) -> LibraryResult<Removal> {
        let artist = catalog::fetch_artist(&mut *conn, artist_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound(format!("artist {}", artist_id)))?;
        let songs = catalog::songs_for_artist(&mut *conn, artist_id).await?;
        if !actor.may_delete(&songs) {
            return Err(LibraryError::Unauthorized(format!(
                "artist {} has no songs uploaded by {}",
                artist_id, actor.user_id
            )));
        }
        let albums = catalog::albums_for_artist(&mut *conn, artist_id).await?;

        let mut removal = Removal::default();
        removal.release_songs(&songs);
        for album in &albums {
            removal.release(album.cover_art.as_deref());
        }
        removal.release(artist.image_url.as_deref());

        let song_ids: Vec<i64> = songs.iter().map(|s| s.id).collect();
        let album_ids: Vec<i64> = albums.iter().map(|a| a.id).collect();
        removal.songs = catalog::delete_songs(&mut *conn, &song_ids).await? as usize;
        removal.albums = catalog::delete_albums(&mut *conn, &album_ids).await? as usize;
        catalog::delete_artists(&mut *conn, &[artist_id]).await?;
        Self::sweep_orphans(&mut *conn, &mut removal).await?;
        Ok(removal)
    }

    /// Remove albums left without songs, then artists left without songs or
    /// albums, releasing their artwork.
    async fn sweep_orphans(conn: &mut SqliteConnection, removal: &mut Removal) -> LibraryResult<()> {
        let albums = catalog::orphan_albums(&mut *conn).await?;
        if !albums.is_empty() {
            for album in &albums {
                removal.release(album.cover_art.as_deref());
            }
            let ids: Vec<i64> = albums.iter().map(|a| a.id).collect();
            removal.albums += catalog::delete_albums(&mut *conn, &ids).await? as usize;
            debug!(albums = ?ids, "swept orphan albums");
        }

        let artists = catalog::orphan_artists(&mut *conn).await?;
        if !artists.is_empty() {
            for artist in &artists {
                removal.release(artist.image_url.as_deref());
            }
            let ids: Vec<i64> = artists.iter().map(|a| a.id).collect();
            catalog::delete_artists(&mut *conn, &ids).await?;
            debug!(artists = ?ids, "swept orphan artists");
        }

        // Content addressing lets several rows share one blob.
        let mut still_used = Vec::new();
        for locator in &removal.locators {
            if catalog::locator_in_use(&mut *conn, locator).await? {
                still_used.push(locator.clone());
            }
        }
        for locator in still_used {
            removal.locators.remove(&locator);
        }
        Ok(())
    }

    /// Commit on success, roll back on failure. Returns the blob keys to
    /// clean up.
    async fn settle(
        &self,
        tx: Transaction<'_, Sqlite>,
        result: LibraryResult<Removal>,
    ) -> LibraryResult<Vec<String>> {
        match result {
            Ok(removal) => {
                tx.commit().await?;
                Ok(removal
                    .locators
                    .iter()
                    .filter_map(|locator| {
                        let key = self.store.key_for_locator(locator);
                        if key.is_none() {
                            debug!(locator = %locator, "locator not owned by the content store");
                        }
                        key
                    })
                    .collect())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Best-effort blob removal. Returns how many blobs the store removed.
    async fn delete_blobs(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let report = self.store.delete_many(keys).await;
        if !report.failed.is_empty() {
            warn!(
                backend = self.store.name(),
                failed = report.failed.len(),
                keys = ?report.failed,
                "blob cleanup incomplete after catalog deletion"
            );
        }
        report.deleted
    }
}
