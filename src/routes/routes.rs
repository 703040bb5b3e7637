//! Defines routes for uploads, deletions and media access.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST   /uploads/init`: register a song batch, returns `uploadId`
//!   - `POST   /uploads/chunk`: one base64 chunk of an image upload
//!   - `POST   /uploads/control`: cancel a chunked upload
//!   - `POST   /uploads/songs`: multipart song batch
//!   - `GET    /uploads/{upload_id}/status`: batch progress
//!
//! - **Deletions**
//!   - `DELETE /songs/{id}`, `/albums/{id}`, `/artists/{id}`
//!
//! - **Media**
//!   - `GET    /media/url?key=..&ttl=..`: signed URL for a stored blob
//!   - `GET    /media/{*key}`: serve a blob from local storage

use crate::{
    handlers::{
        delete_handlers::{delete_album, delete_artist, delete_song},
        health_handlers::{healthz, readyz},
        media_handlers::{serve_media, signed_url},
        upload_handlers::{control_upload, init_upload, upload_chunk, upload_songs, upload_status},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build the router. `max_body_bytes` bounds chunk and song batch bodies.
pub fn routes(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // uploads
        .route("/uploads/init", post(init_upload))
        .route(
            "/uploads/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route("/uploads/control", post(control_upload))
        .route(
            "/uploads/songs",
            post(upload_songs).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route("/uploads/{upload_id}/status", get(upload_status))
        // deletions
        .route("/songs/{id}", delete(delete_song))
        .route("/albums/{id}", delete(delete_album))
        .route("/artists/{id}", delete(delete_artist))
        // media
        .route("/media/url", get(signed_url))
        .route("/media/{*key}", get(serve_media))
}
