//! JSON API handlers

use super::messages::{IdQuery, ReceiveRequest, SendTextRequest, TransferCreated};
use crate::error::{ApiError, StorageError, ValidationError};
use crate::state::AppState;
use crate::storage::open_secure_file;
use crate::transfer::{Direction, StagedPart, TransferRecord, TransferState, UploadBatch};
use crate::validate::{is_valid_transfer_id, sanitize_filename};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Parse a JSON body, mapping any failure to a 400
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|_| ValidationError::InvalidBody)
}

/// Check the `id` query parameter is present and well formed
pub(crate) fn require_id(query: IdQuery) -> Result<String, ValidationError> {
    match query.id {
        None => Err(ValidationError::MissingId),
        Some(id) if id.is_empty() => Err(ValidationError::MissingId),
        Some(id) if !is_valid_transfer_id(&id) => Err(ValidationError::InvalidTransferId),
        Some(id) => Ok(id),
    }
}

pub async fn send_text(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TransferCreated>, ApiError> {
    let request: SendTextRequest = parse_body(&body)?;
    let id = state.start_send_text(request.text)?;
    Ok(Json(TransferCreated { id }))
}

pub async fn receive(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TransferCreated>, ApiError> {
    let request: ReceiveRequest = parse_body(&body)?;
    let id = state.start_receive(request.code)?;
    Ok(Json(TransferCreated { id }))
}

/// Stage every uploaded part on disk, then hand the batch to a new transfer.
pub async fn send_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TransferCreated>, ApiError> {
    let id = state.next_id(Direction::Send);
    let dir = state.storage.create_transfer_dir(&id).await?;

    match stage_upload(&dir, &mut multipart).await {
        Ok(batch) => Ok(Json(TransferCreated {
            id: state.start_send_files(id, batch),
        })),
        Err(e) => {
            state.storage.remove_transfer_dir(&id).await;
            Err(e)
        }
    }
}

async fn stage_upload(dir: &FsPath, multipart: &mut Multipart) -> Result<UploadBatch, ApiError> {
    let mut files = Vec::new();
    let mut single = None;
    let mut paths = Vec::new();
    let mut index = 0usize;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(kind @ ("files" | "file")) => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let path = dir.join(format!(".upload-{index}"));
                index += 1;

                let mut file = open_secure_file(&path).await.map_err(StorageError::from)?;
                let mut size = 0u64;
                while let Some(chunk) = field.chunk().await? {
                    file.write_all(&chunk).await.map_err(StorageError::from)?;
                    size += chunk.len() as u64;
                }
                file.flush().await.map_err(StorageError::from)?;

                let part = StagedPart {
                    path,
                    original_name,
                    size,
                };
                if kind == "files" {
                    files.push(part);
                } else if single.is_none() {
                    single = Some(part);
                }
            }
            Some("paths") => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    paths = serde_json::from_str(&raw).map_err(|_| ValidationError::InvalidPaths)?;
                }
            }
            _ => {}
        }
    }

    // `files` wins; a lone `file` field is the single-upload form
    let parts = if files.is_empty() {
        single.into_iter().collect::<Vec<_>>()
    } else {
        files
    };
    if parts.is_empty() {
        return Err(ValidationError::NoFiles.into());
    }

    Ok(UploadBatch {
        dir: dir.to_path_buf(),
        parts,
        paths,
    })
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<TransferRecord>, ApiError> {
    let id = require_id(query)?;
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or(ApiError::NotFound("Transfer not found"))
}

/// `/api/download/{id}/{filename}`
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> Result<Response, ApiError> {
    let (transfer_id, filename) = rest.split_once('/').ok_or(ValidationError::InvalidPath)?;
    if !is_valid_transfer_id(transfer_id) {
        return Err(ValidationError::InvalidTransferId.into());
    }

    let record = state
        .registry
        .get(transfer_id)
        .ok_or(ApiError::NotFound("Transfer not found"))?;
    if record.state != TransferState::Complete {
        return Err(ApiError::NotFound("File not found"));
    }

    let path = state.storage.resolve_download(transfer_id, filename).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound("File not found"))?;
    let length = file.metadata().await.map_err(StorageError::from)?.len();

    let safe_name = sanitize_filename(filename);
    let mime = mime_guess::from_path(&safe_name).first_or_octet_stream();
    tracing::info!(transfer_id, file = %safe_name, bytes = length, "Serving download");

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&safe_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Attachment header with an ASCII fallback name and an RFC 5987
/// UTF-8 name for everything else.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
