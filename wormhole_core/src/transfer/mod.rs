//! Transfer records, their lifecycle and the tasks that drive them.
//!
//! - `record`: the status object and its state machine
//! - `registry` / `broadcaster`: shared store and live fan-out
//! - `orchestrator`: one task per transfer
//! - `sweeper`: periodic cleanup of old transfers

pub mod archive;
pub mod broadcaster;
pub mod constants;
pub mod id;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod registry;
pub mod sweeper;
pub mod upload;

// Re-export public API
pub use broadcaster::{Broadcaster, Frame, Subscription};
pub use id::IdGenerator;
pub use orchestrator::TransferOrchestrator;
pub use progress::{ProgressObserver, ProgressReader};
pub use record::{Direction, TransferRecord, TransferState};
pub use registry::TransferRegistry;
pub use sweeper::LifecycleSweeper;
pub use upload::{Payload, StagedPart, UploadBatch};
