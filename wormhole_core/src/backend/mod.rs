//! Transfer backend abstraction
//!
//! The orchestrator only talks to this trait; the rendezvous/relay protocol
//! behind it is opaque.

pub mod mailbox;

use crate::error::BackendError;
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;

pub use mailbox::MailboxBackend;

/// Owned byte stream handed to or returned from a backend
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Final result of a send, reported once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

/// A send that has been offered and is waiting for its peer.
///
/// Dropping it withdraws the offer if nobody has claimed it yet.
#[derive(Debug)]
pub struct PendingTransfer {
    /// Code the receiving side must enter
    pub code: String,
    pub completion: oneshot::Receiver<TransferOutcome>,
    withdraw: Withdraw,
}

impl PendingTransfer {
    pub fn new(code: String, completion: oneshot::Receiver<TransferOutcome>) -> Self {
        Self {
            code,
            completion,
            withdraw: Withdraw(None),
        }
    }

    /// Run `withdraw` when this handle is dropped
    pub fn on_drop(mut self, withdraw: impl FnOnce() + Send + 'static) -> Self {
        self.withdraw = Withdraw(Some(Box::new(withdraw)));
        self
    }
}

/// Kept as a field so `completion` can still be moved out of the handle
struct Withdraw(Option<Box<dyn FnOnce() + Send>>);

impl std::fmt::Debug for Withdraw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.is_some() { "Withdraw(armed)" } else { "Withdraw" })
    }
}

impl Drop for Withdraw {
    fn drop(&mut self) {
        if let Some(withdraw) = self.0.take() {
            withdraw();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    File,
}

/// A message claimed by a receiver
pub struct IncomingMessage {
    pub name: String,
    pub total_bytes: u64,
    pub kind: PayloadKind,
    stream: ByteStream,
}

impl IncomingMessage {
    pub fn new(name: impl Into<String>, total_bytes: u64, kind: PayloadKind, stream: ByteStream) -> Self {
        Self {
            name: name.into(),
            total_bytes,
            kind,
            stream,
        }
    }
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("name", &self.name)
            .field("total_bytes", &self.total_bytes)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for IncomingMessage {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Offer a text message; returns its code once the offer is registered
    async fn send_text(&self, text: String) -> Result<PendingTransfer, BackendError>;

    /// Offer a file of `size` bytes read from `stream`
    async fn send_file(
        &self,
        name: String,
        size: u64,
        stream: ByteStream,
    ) -> Result<PendingTransfer, BackendError>;

    /// Claim the message offered under `code`
    async fn receive(&self, code: &str) -> Result<IncomingMessage, BackendError>;
}
