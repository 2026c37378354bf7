//! Shared application state
//!
//! Built once by the binary (or a test) and handed to the router as
//! `Arc<AppState>`.

use crate::backend::TransferBackend;
use crate::config::ServerConfig;
use crate::error::{StorageError, ValidationError};
use crate::storage::Storage;
use crate::transfer::{
    Direction, IdGenerator, LifecycleSweeper, TransferOrchestrator, TransferRecord,
    TransferRegistry, UploadBatch,
};
use crate::validate::is_valid_exchange_code;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<TransferRegistry>,
    pub storage: Storage,
    pub backend: Arc<dyn TransferBackend>,
    pub tasks: TaskTracker,
    pub shutdown: CancellationToken,
    ids: IdGenerator,
}

impl AppState {
    /// Create the state and make sure the storage root exists
    pub async fn new(
        config: ServerConfig,
        backend: Arc<dyn TransferBackend>,
        shutdown: CancellationToken,
    ) -> Result<Self, StorageError> {
        let storage = Storage::new(config.storage_dir.clone());
        storage.init().await?;

        Ok(Self {
            config,
            registry: Arc::new(TransferRegistry::new()),
            storage,
            backend,
            tasks: TaskTracker::new(),
            shutdown,
            ids: IdGenerator::new(),
        })
    }

    pub fn next_id(&self, direction: Direction) -> String {
        self.ids.next(direction)
    }

    /// Register `record` and build the task that drives it. The task stops
    /// when the record is deleted or the server shuts down.
    fn orchestrator(&self, record: TransferRecord) -> TransferOrchestrator {
        let cancel = self.registry.insert(record.clone(), &self.shutdown);
        TransferOrchestrator::new(
            record,
            Arc::clone(&self.registry),
            self.storage.clone(),
            Arc::clone(&self.backend),
            cancel,
        )
    }

    /// Register a text send and start it. Returns the transfer id.
    pub fn start_send_text(&self, text: String) -> Result<String, ValidationError> {
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let id = self.next_id(Direction::Send);
        let record = TransferRecord::new(id.clone(), Direction::Send);
        tracing::info!(transfer_id = %id, bytes = text.len(), "Text send started");

        let orchestrator = self.orchestrator(record);
        self.tasks.spawn(orchestrator.run_send_text(text));
        Ok(id)
    }

    /// Register a file send whose parts are already staged under `id`.
    pub fn start_send_files(&self, id: String, batch: UploadBatch) -> String {
        let record = TransferRecord::new(id.clone(), Direction::Send);
        tracing::info!(transfer_id = %id, parts = batch.parts.len(), "File send started");

        let orchestrator = self.orchestrator(record);
        self.tasks.spawn(orchestrator.run_send_file(batch));
        id
    }

    /// Register a receive for `code` and start it. Returns the transfer id.
    pub fn start_receive(&self, code: String) -> Result<String, ValidationError> {
        if code.is_empty() {
            return Err(ValidationError::MissingCode);
        }
        if !is_valid_exchange_code(&code) {
            return Err(ValidationError::InvalidCode);
        }

        let id = self.next_id(Direction::Receive);
        let mut record = TransferRecord::new(id.clone(), Direction::Receive);
        record.exchange_code = Some(code.clone());
        tracing::info!(transfer_id = %id, %code, "Receive started");

        let orchestrator = self.orchestrator(record);
        self.tasks.spawn(orchestrator.run_receive(code));
        Ok(id)
    }

    /// Start the periodic cleanup task
    pub fn spawn_sweeper(&self) {
        LifecycleSweeper::new(
            Arc::clone(&self.registry),
            self.storage.clone(),
            self.config.transfer_ttl(),
            self.config.cleanup_interval(),
        )
        .spawn(self.shutdown.clone(), &self.tasks);
    }

    /// Wait for running transfers to finish, up to `timeout`.
    /// Returns `false` if some were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Timed out waiting for transfers to finish"
            );
        }
        drained
    }
}
