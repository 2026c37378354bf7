//! Transfer orchestration and notification engine behind the wormhole web UI.
//!
//! Browser requests become transfer records in a [`TransferRegistry`]; a
//! background task per transfer drives the [`TransferBackend`] and
//! republishes the record, and WebSocket clients receive every change.

pub mod backend;
pub mod config;
pub mod error;
pub mod http_share;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod validate;

pub use backend::{MailboxBackend, TransferBackend};
pub use config::ServerConfig;
pub use error::{ApiError, BackendError, StorageError, ValidationError};
pub use state::AppState;
pub use storage::Storage;
pub use transfer::{Direction, TransferRecord, TransferRegistry, TransferState};
