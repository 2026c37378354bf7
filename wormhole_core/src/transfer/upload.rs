//! Staged upload parts and turning them into one sendable file

use super::archive;
use crate::error::StorageError;
use crate::validate::sanitize_filename;
use std::path::PathBuf;

/// One uploaded file part, already written to the transfer directory
#[derive(Debug, Clone)]
pub struct StagedPart {
    pub path: PathBuf,
    /// Filename as the client sent it, unsanitized
    pub original_name: String,
    pub size: u64,
}

/// Everything a file send needs before the backend is involved
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub dir: PathBuf,
    pub parts: Vec<StagedPart>,
    /// Relative paths aligned with `parts` by index; may be shorter
    pub paths: Vec<String>,
}

/// The file that will actually be offered to the peer
#[derive(Debug, Clone)]
pub struct Payload {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl UploadBatch {
    /// Produce the payload: a single part is renamed to its sanitized name,
    /// several parts are packed into an archive on a blocking thread.
    pub async fn materialize(self) -> Result<Payload, StorageError> {
        if self.parts.len() > 1 {
            let archive = tokio::task::spawn_blocking(move || {
                archive::package(&self.dir, &self.parts, &self.paths)
            })
            .await
            .map_err(|e| StorageError::Archive(e.to_string()))??;
            return Ok(Payload {
                path: archive.path,
                name: archive.name,
                size: archive.size,
            });
        }

        let Some(single) = self.parts.first() else {
            return Err(StorageError::Archive("no file parts to send".to_string()));
        };
        let name = sanitize_filename(&single.original_name);
        let path = self.dir.join(&name);
        tokio::fs::rename(&single.path, &path).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        Ok(Payload { path, name, size })
    }
}
