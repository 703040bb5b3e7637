//! HTTP handlers for chunked image uploads and song batches.

use super::identity::actor_from_headers;
use crate::{
    errors::AppError,
    models::upload::{
        ActiveUpload, BatchUploadReport, ChunkRequest, ChunkResponse, SongMetadata,
        UploadAction, UploadControlRequest, UploadInitRequest, UploadInitResponse,
    },
    services::upload_service::IncomingSong,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::HeaderMap,
};
use serde_json::{Value, json};

/// `POST /uploads/init`: register a song batch for progress polling.
pub async fn init_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadInitRequest>,
) -> Result<Json<UploadInitResponse>, AppError> {
    let actor = actor_from_headers(&headers)?;
    let upload_id = state
        .uploads
        .begin_batch(&actor.user_id, req.file_count, req.total_size)?;
    Ok(Json(UploadInitResponse { upload_id }))
}

/// `POST /uploads/chunk`: one base64 chunk of an image upload.
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<ChunkResponse>, AppError> {
    let actor = actor_from_headers(&headers)?;
    let response = state.uploads.submit_chunk(req, &actor.user_id).await?;
    Ok(Json(response))
}

/// `POST /uploads/control`: cancel an in-flight chunked upload.
pub async fn control_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadControlRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_headers(&headers)?;
    match req.action {
        UploadAction::Cancel => state.uploads.cancel_chunked(&req.upload_id, &actor.user_id)?,
    }
    Ok(Json(json!({ "success": true, "uploadId": req.upload_id })))
}

/// `GET /uploads/{upload_id}/status`
pub async fn upload_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(upload_id): Path<String>,
) -> Result<Json<ActiveUpload>, AppError> {
    let actor = actor_from_headers(&headers)?;
    match state.uploads.batch_status(&upload_id) {
        Some(active) if actor.is_admin || active.username == actor.user_id => Ok(Json(active)),
        _ => Err(AppError::not_found(format!("upload {} not found", upload_id))),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// `POST /uploads/songs`: multipart batch of audio files.
///
/// Parts: repeated `files`, one `metadata` JSON array aligned with the files
/// by position, and an optional `uploadId` from `/uploads/init`. Individual
/// file failures are reported per file; the request itself succeeds.
pub async fn upload_songs(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<BatchUploadReport>, AppError> {
    let actor = actor_from_headers(&headers)?;

    let mut files = Vec::new();
    let mut metadata: Vec<SongMetadata> = Vec::new();
    let mut upload_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("file-{}", files.len() + 1));
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push((filename, content_type, data));
            }
            Some("metadata") => {
                let text = field.text().await.map_err(multipart_error)?;
                metadata = serde_json::from_str(&text)
                    .map_err(|err| AppError::bad_request(format!("invalid metadata: {}", err)))?;
            }
            Some("uploadId") => {
                let text = field.text().await.map_err(multipart_error)?;
                upload_id = Some(text.trim().to_string()).filter(|id| !id.is_empty());
            }
            other => {
                tracing::debug!("ignoring multipart field {:?}", other);
            }
        }
    }

    if files.is_empty() {
        return Err(AppError::bad_request("no files in request"));
    }

    let mut metadata = metadata.into_iter();
    let songs = files
        .into_iter()
        .map(|(filename, content_type, data)| IncomingSong {
            filename,
            content_type,
            data,
            metadata: metadata.next().unwrap_or_default(),
        })
        .collect();

    let report = state
        .uploads
        .process_batch(songs, &actor.user_id, upload_id.as_deref())
        .await;
    Ok(Json(report))
}
