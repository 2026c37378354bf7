//! Drives one transfer from start to a terminal state
//!
//! Each orchestrator owns a working copy of its record and republishes it
//! through the registry after every change. Nothing else writes that id.
//! Once the record is deleted the registry refuses further updates and the
//! transfer's token fires, which ends the task.

use super::constants::BUFFER_SIZE;
use super::progress::ProgressReader;
use super::record::{TransferRecord, TransferState};
use super::registry::TransferRegistry;
use super::upload::UploadBatch;
use crate::backend::{IncomingMessage, PayloadKind, PendingTransfer, TransferBackend};
use crate::storage::{Storage, open_secure_file};
use crate::validate::sanitize_filename;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Recorded when the transfer's token fires. A deleted record never shows
/// it, since its updates are refused.
const SHUTTING_DOWN: &str = "server shutting down";

pub struct TransferOrchestrator {
    record: TransferRecord,
    registry: Arc<TransferRegistry>,
    storage: Storage,
    backend: Arc<dyn TransferBackend>,
    cancel: CancellationToken,
}

impl TransferOrchestrator {
    pub fn new(
        record: TransferRecord,
        registry: Arc<TransferRegistry>,
        storage: Storage,
        backend: Arc<dyn TransferBackend>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            record,
            registry,
            storage,
            backend,
            cancel,
        }
    }

    /// Republish the working copy. Returns `false` if the record was deleted.
    fn publish(&self) -> bool {
        let live = self.registry.update(self.record.clone());
        if !live {
            tracing::debug!(transfer_id = %self.record.id, "Record was removed, dropping update");
        }
        live
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.record.advance(TransferState::Error) {
            self.record.error_message = Some(message.clone());
            if self.publish() {
                tracing::warn!(transfer_id = %self.record.id, "Transfer failed: {}", message);
            }
        }
    }

    fn complete(&mut self) {
        if self.record.advance(TransferState::Complete) && self.publish() {
            tracing::info!(transfer_id = %self.record.id, "Transfer complete");
        }
    }

    /// Publish the code, then wait for the peer to finish or the token to fire.
    async fn await_completion(&mut self, mut pending: PendingTransfer) {
        tracing::info!(transfer_id = %self.record.id, code = %pending.code, "Waiting for receiver");
        self.record.exchange_code = Some(pending.code.clone());
        self.record.advance(TransferState::Waiting);
        if !self.publish() {
            return;
        }

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            outcome = &mut pending.completion => Some(outcome),
            _ = cancel.cancelled() => None,
        };

        match outcome {
            Some(Ok(outcome)) if outcome.ok => self.complete(),
            Some(Ok(outcome)) => {
                self.fail(outcome.error.unwrap_or_else(|| "transfer failed".to_string()))
            }
            Some(Err(_)) => self.fail("transfer aborted by backend"),
            None => self.fail(SHUTTING_DOWN),
        }
    }

    pub async fn run_send_text(mut self, text: String) {
        match self.backend.send_text(text).await {
            Ok(pending) => self.await_completion(pending).await,
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Send an uploaded batch. The transfer directory is removed when this
    /// returns, whatever the outcome.
    pub async fn run_send_file(mut self, batch: UploadBatch) {
        self.send_file(batch).await;
        self.storage.remove_transfer_dir(&self.record.id).await;
    }

    async fn send_file(&mut self, batch: UploadBatch) {
        let payload = match batch.materialize().await {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(format!("failed to prepare upload: {e}"));
                return;
            }
        };

        self.record.filename = Some(payload.name.clone());
        self.record.bytes_total = payload.size;
        if !self.publish() {
            return;
        }

        let file = match tokio::fs::File::open(&payload.path).await {
            Ok(file) => file,
            Err(e) => {
                self.fail(format!("failed to open upload: {e}"));
                return;
            }
        };

        match self
            .backend
            .send_file(payload.name, payload.size, Box::new(file))
            .await
        {
            Ok(pending) => self.await_completion(pending).await,
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub async fn run_receive(mut self, code: String) {
        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let claimed = tokio::select! {
            result = backend.receive(&code) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let message = match claimed {
            Some(Ok(message)) => message,
            Some(Err(e)) => return self.fail(e.to_string()),
            None => return self.fail(SHUTTING_DOWN),
        };

        self.record.bytes_total = message.total_bytes;
        if message.kind == PayloadKind::File {
            self.record.filename = Some(sanitize_filename(&message.name));
        }
        if !self.publish() {
            return;
        }

        match message.kind {
            PayloadKind::Text => self.receive_text(message).await,
            PayloadKind::File => self.receive_file(message).await,
        }
    }

    async fn receive_text(&mut self, mut message: IncomingMessage) {
        let mut bytes = Vec::new();
        if let Err(e) = message.read_to_end(&mut bytes).await {
            return self.fail(e.to_string());
        }
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => return self.fail("received text is not valid UTF-8"),
        };

        self.record.bytes_transferred = text.len() as u64;
        self.record.progress_percent = 100.0;
        self.record.text_content = Some(text);
        self.complete();
    }

    async fn receive_file(&mut self, message: IncomingMessage) {
        let id = self.record.id.clone();
        let filename = self
            .record
            .filename
            .clone()
            .unwrap_or_else(|| sanitize_filename(""));

        let dir = match self.storage.create_transfer_dir(&id).await {
            Ok(dir) => dir,
            Err(e) => return self.fail(e.to_string()),
        };

        match self.write_file(message, &dir.join(&filename)).await {
            Ok(written) => {
                self.record.record_progress(written);
                self.record.progress_percent = 100.0;
                self.record.download_path = Some(download_path(&id, &filename));
                self.complete();
            }
            Err(message) => {
                self.fail(message);
                self.storage.remove_transfer_dir(&id).await;
                return;
            }
        }

        // Deleted while writing: the sweeper may have run before the
        // directory existed, so it is ours to remove.
        if !self.registry.contains(&id) {
            self.storage.remove_transfer_dir(&id).await;
        }
    }

    /// Stream the message to `path`, republishing progress as bytes arrive.
    async fn write_file(&self, message: IncomingMessage, path: &Path) -> Result<u64, String> {
        let mut file = open_secure_file(path)
            .await
            .map_err(|e| format!("failed to create {}: {e}", path.display()))?;

        let registry = Arc::clone(&self.registry);
        let base = self.record.clone();
        let observer = move |transferred: u64| {
            let mut snapshot = base.clone();
            snapshot.record_progress(transferred);
            registry.update(snapshot);
        };
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, ProgressReader::new(message, observer));

        let cancel = self.cancel.clone();
        let copied = tokio::select! {
            result = tokio::io::copy_buf(&mut reader, &mut file) => result.map_err(|e| e.to_string())?,
            _ = cancel.cancelled() => return Err(SHUTTING_DOWN.to_string()),
        };
        file.flush().await.map_err(|e| e.to_string())?;
        Ok(copied)
    }
}

/// `/api/download/{id}/{filename}` with the filename percent-encoded
pub fn download_path(transfer_id: &str, filename: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return format!("/api/download/{transfer_id}/{filename}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.extend(["api", "download", transfer_id, filename]);
    }
    url.path().to_string()
}
