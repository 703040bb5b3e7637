//! Catalog rows touched by the upload and deletion flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An artist, owned by the user whose upload created it.
///
/// Artist identity is `(name, created_by)`: two users uploading the same
/// artist name get two distinct rows.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// Locator of the artist image, if one was uploaded.
    pub image_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An album, attributed to its primary artist.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist_id: i64,
    /// Locator of the album artwork. Backfilled from the first song that
    /// carries artwork.
    pub cover_art: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A song and the locators of the blobs it references.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub album_id: Option<i64>,
    /// Locator of the audio file (content-addressed).
    pub file_path: String,
    /// Locator of the per-song artwork.
    pub cover_art: Option<String>,
    pub duration: Option<i64>,
    pub track_number: Option<i64>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}
