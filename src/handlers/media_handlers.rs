//! Media access: signed URL issuance and local-disk blob serving.

use super::identity::actor_from_headers;
use crate::{
    errors::AppError,
    services::content_store::{content_type_for, ensure_key_safe},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{io::ErrorKind, time::Duration};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Folders readable without a signature. Audio always needs one.
const PUBLIC_FOLDERS: &[&str] = &["profiles", "artist_images", "album_art", "song_art"];

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub key: String,
    /// Seconds.
    pub ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// `GET /media/url?key=..&ttl=..`
pub async fn signed_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<Value>, AppError> {
    actor_from_headers(&headers)?;
    ensure_key_safe(&query.key)?;
    let ttl = query
        .ttl
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(state.default_url_ttl);
    let url = state.urls.get_url(&query.key, ttl).await?;
    Ok(Json(json!({ "url": url, "expiresIn": ttl.as_secs() })))
}

/// `GET /media/{*key}`: stream a blob from the local store.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, AppError> {
    let Some(local) = state.local.as_ref() else {
        return Err(AppError::not_found("media is not served by this instance"));
    };
    let is_public = key
        .split_once('/')
        .is_some_and(|(folder, _)| PUBLIC_FOLDERS.contains(&folder));
    if !is_public {
        let valid = match (query.expires, query.signature.as_deref()) {
            (Some(expires), Some(signature)) => local.verify_signature(&key, expires, signature),
            _ => false,
        };
        if !valid {
            return Err(AppError::forbidden("missing or expired signature"));
        }
    }

    let path = local.object_path(&key)?;
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AppError::not_found(format!("{} not found", key)));
        }
        Err(err) => return Err(AppError::internal(err.to_string())),
    };
    let size = file.metadata().await.ok().map(|m| m.len());

    let extension = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(extension)),
    );
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=3600"),
    );
    Ok(response)
}
