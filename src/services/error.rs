//! Errors raised by the upload and deletion engine.

use super::content_store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    /// Unknown upload id, or a chunk from a user other than the session owner.
    #[error("invalid upload session: {0}")]
    InvalidSession(String),
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("not allowed: {0}")]
    Unauthorized(String),
    /// The same bytes are already stored as another song.
    #[error("duplicate file: already uploaded as song {existing_song_id}")]
    DuplicateFile { existing_song_id: i64 },
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("catalog failure: {0}")]
    Catalog(#[from] sqlx::Error),
    /// Assembly reached a state that should be impossible, e.g. a missing
    /// chunk after every chunk was counted.
    #[error("upload corrupted: {0}")]
    Fatal(String),
}

pub type LibraryResult<T> = Result<T, LibraryError>;
