//! Upload request/response shapes and upload roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an uploaded blob is for. Selects the storage folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRole {
    Avatar,
    ArtistImage,
    #[default]
    AlbumArt,
    SongArt,
    Song,
}

impl UploadRole {
    /// Storage folder prefix for this role.
    pub fn folder(&self) -> &'static str {
        match self {
            UploadRole::Avatar => "profiles",
            UploadRole::ArtistImage => "artist_images",
            UploadRole::AlbumArt => "album_art",
            UploadRole::SongArt => "song_art",
            UploadRole::Song => "songs",
        }
    }

    /// Whether the role may be uploaded through the chunked image channel.
    pub fn is_image(&self) -> bool {
        !matches!(self, UploadRole::Song)
    }

    /// Extension used when neither the filename nor the MIME type gives one.
    pub fn default_extension(&self) -> &'static str {
        if self.is_image() { "jpg" } else { "mp3" }
    }
}

impl fmt::Display for UploadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder())
    }
}

/// One chunk of a chunked image upload, as received from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Raw base64 or a `data:<mime>;base64,` URL fragment.
    pub chunk: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Only read from the chunk that opens the session.
    #[serde(default)]
    pub role: Option<UploadRole>,
}

/// Reply to a chunk submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub done: bool,
    pub received: u32,
    pub total: u32,
    pub progress_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A finalized, stored upload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub key: String,
    pub locator: String,
    pub url: String,
    pub role: UploadRole,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadAction {
    Cancel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadControlRequest {
    pub upload_id: String,
    pub action: UploadAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    pub file_count: u32,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitResponse {
    pub upload_id: String,
}

/// Artwork attached to a song upload.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkPayload {
    /// Base64 or data URL.
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Client-declared metadata for one song file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SongMetadata {
    #[serde(default)]
    pub title: Option<String>,
    /// First entry is the primary artist.
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub track_number: Option<i64>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub artwork: Option<ArtworkPayload>,
}

/// Outcome for one file of a batch upload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Batch upload report. Always returned with a success envelope; callers
/// inspect `summary.failed`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchUploadReport {
    pub summary: BatchSummary,
    pub results: Vec<FileResult>,
}

/// Observational progress of an HTTP song batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUpload {
    pub upload_id: String,
    pub username: String,
    pub total_files: u32,
    pub total_size: u64,
    pub processed_files: u32,
    pub current_file: Option<String>,
    pub start_time: DateTime<Utc>,
}
