//! HTTP handlers for cascading catalog deletions.

use super::identity::actor_from_headers;
use crate::{
    errors::AppError,
    services::deletion_service::{DeleteAlbumOutcome, DeleteArtistOutcome, DeleteSongOutcome},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

/// `DELETE /songs/{id}`
pub async fn delete_song(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(song_id): Path<i64>,
) -> Result<Json<DeleteSongOutcome>, AppError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.deletions.delete_song(song_id, &actor).await?))
}

/// `DELETE /albums/{id}`
pub async fn delete_album(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(album_id): Path<i64>,
) -> Result<Json<DeleteAlbumOutcome>, AppError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.deletions.delete_album(album_id, &actor).await?))
}

/// `DELETE /artists/{id}`
pub async fn delete_artist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(artist_id): Path<i64>,
) -> Result<Json<DeleteArtistOutcome>, AppError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.deletions.delete_artist(artist_id, &actor).await?))
}
