//! Error types
//!
//! Validation failures are rejected before a transfer exists. Backend and
//! storage failures that happen inside a transfer end up in the record's
//! `error` field instead of being returned to a caller.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

/// Malformed client input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Text is required")]
    EmptyText,
    #[error("Code is required")]
    MissingCode,
    #[error("Invalid wormhole code format")]
    InvalidCode,
    #[error("ID is required")]
    MissingId,
    #[error("Invalid transfer ID")]
    InvalidTransferId,
    #[error("Invalid path")]
    InvalidPath,
    #[error("At least one file is required")]
    NoFiles,
    #[error("Invalid paths field")]
    InvalidPaths,
}

/// Local disk failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    InvalidId(#[from] ValidationError),
    #[error("failed to create archive: {0}")]
    Archive(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for StorageError {
    fn from(err: zip::result::ZipError) -> Self {
        StorageError::Archive(err.to_string())
    }
}

/// Failures reported by the transfer backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no transfer is waiting for code {0}")]
    UnknownCode(String),
    #[error("{0}")]
    Remote(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Access denied")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Internal paths stay in the log, not in the response
            ApiError::Storage(e) => {
                tracing::error!("Storage error while handling request: {}", e);
                "Failed to save file".to_string()
            }
            ApiError::Multipart(e) => e.body_text(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
