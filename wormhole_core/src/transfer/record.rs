//! Transfer record and its wire schema
//!
//! The JSON field names are what the browser client reads, so they are
//! fixed here rather than derived from the Rust field names.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Which way the bytes flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    /// Prefix used in transfer ids (`send-…` / `recv-…`)
    pub fn id_prefix(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "recv",
        }
    }
}

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Sending,
    Waiting,
    Receiving,
    Complete,
    Error,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Complete | TransferState::Error)
    }

    fn rank(self) -> u8 {
        match self {
            TransferState::Sending | TransferState::Receiving => 0,
            TransferState::Waiting => 1,
            TransferState::Complete | TransferState::Error => 2,
        }
    }

    /// Whether `next` is reachable from `self` without going backwards.
    ///
    /// Staying in a non-terminal state is allowed (progress updates);
    /// a terminal state never changes.
    pub fn can_advance_to(self, next: TransferState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (TransferState::Receiving, TransferState::Sending | TransferState::Waiting) => false,
            (TransferState::Sending | TransferState::Waiting, TransferState::Receiving) => false,
            // A send completes only after its peer has been waited for
            (TransferState::Sending, TransferState::Complete) => false,
            _ => next.rank() >= self.rank(),
        }
    }
}

/// The authoritative status object for one send or receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    #[serde(rename = "status")]
    pub state: TransferState,
    #[serde(rename = "code", skip_serializing_if = "Option::is_none", default)]
    pub exchange_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(rename = "progress")]
    pub progress_percent: f64,
    #[serde(rename = "transferred")]
    pub bytes_transferred: u64,
    #[serde(rename = "total")]
    pub bytes_total: u64,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    #[serde(
        rename = "textContent",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub text_content: Option<String>,
    #[serde(
        rename = "downloadPath",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub download_path: Option<String>,
    #[serde(skip, default = "SystemTime::now")]
    pub created_at: SystemTime,
    /// Stamped by the registry on every `set`
    #[serde(skip, default = "SystemTime::now")]
    pub updated_at: SystemTime,
}

impl TransferRecord {
    pub fn new(id: impl Into<String>, direction: Direction) -> Self {
        let now = SystemTime::now();
        let state = match direction {
            Direction::Send => TransferState::Sending,
            Direction::Receive => TransferState::Receiving,
        };
        Self {
            id: id.into(),
            direction,
            state,
            exchange_code: None,
            filename: None,
            progress_percent: 0.0,
            bytes_transferred: 0,
            bytes_total: 0,
            error_message: None,
            text_content: None,
            download_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if the transition goes forward. Returns whether it did.
    pub fn advance(&mut self, next: TransferState) -> bool {
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Apply a cumulative byte count from the progress tracker.
    ///
    /// Never lowers the count; percentage stays 0 until the total is known.
    pub fn record_progress(&mut self, transferred: u64) {
        if transferred < self.bytes_transferred {
            return;
        }
        self.bytes_transferred = transferred;
        if self.bytes_total > 0 {
            let percent = transferred as f64 / self.bytes_total as f64 * 100.0;
            self.progress_percent = percent.clamp(self.progress_percent, 100.0);
        }
    }
}
