//! Per-transfer storage directories
//!
//! Every transfer that touches disk gets `<root>/<transfer id>/`. Ids are
//! validated before they are joined onto the root.

use crate::error::{ApiError, StorageError, ValidationError};
use crate::validate::{is_valid_transfer_id, sanitize_filename};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist yet
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    /// Directory for one transfer, without touching the filesystem
    pub fn transfer_dir(&self, transfer_id: &str) -> Result<PathBuf, ValidationError> {
        if !is_valid_transfer_id(transfer_id) {
            return Err(ValidationError::InvalidTransferId);
        }
        Ok(self.root.join(transfer_id))
    }

    /// Create (or reuse) the directory for one transfer
    pub async fn create_transfer_dir(&self, transfer_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.transfer_dir(transfer_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Remove a transfer's directory. Missing directories are fine; other
    /// failures are logged and otherwise ignored.
    pub async fn remove_transfer_dir(&self, transfer_id: &str) {
        let Ok(dir) = self.transfer_dir(transfer_id) else {
            return;
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(transfer_id, "Removed transfer directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                transfer_id,
                "Failed to remove transfer directory {}: {}",
                dir.display(),
                e
            ),
        }
    }

    /// Remove the whole storage root (used on shutdown)
    pub async fn remove_all(&self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::info!("Removed transfer storage {}", self.root.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove transfer storage {}: {}",
                self.root.display(),
                e
            ),
        }
    }

    /// Resolve a download request to a file inside the storage root.
    ///
    /// The id must be well formed and the filename is reduced to a single
    /// sanitized component. The final path is canonicalized and must still
    /// sit under the canonical root, which also rules out symlinks leading
    /// elsewhere.
    pub async fn resolve_download(
        &self,
        transfer_id: &str,
        filename: &str,
    ) -> Result<PathBuf, ApiError> {
        let dir = self.transfer_dir(transfer_id)?;
        let candidate = dir.join(sanitize_filename(filename));

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| ApiError::NotFound("File not found"))?;
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| ApiError::NotFound("File not found"))?;

        if !resolved.starts_with(&root) || resolved == root {
            tracing::warn!(transfer_id, "Rejected download outside storage root");
            return Err(ApiError::Forbidden);
        }
        if !tokio::fs::metadata(&resolved)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(ApiError::NotFound("File not found"));
        }
        Ok(resolved)
    }
}

/// Open a file with secure permissions (0o600 on Unix) for writing
pub async fn open_secure_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    options.open(path).await
}
