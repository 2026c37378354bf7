//! In-process rendezvous backend
//!
//! Senders park an offer under a fresh code; the first receiver presenting
//! that code takes it. Both sides run in the same process, which is enough
//! to drive the web UI end to end without an external relay. An offer whose
//! `PendingTransfer` is dropped before it is claimed is withdrawn, releasing
//! its payload.

use super::{
    ByteStream, IncomingMessage, PayloadKind, PendingTransfer, TransferBackend, TransferOutcome,
};
use crate::error::BackendError;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;

const CODE_WORDS: &[&str] = &[
    "absurd", "amulet", "anchor", "artist", "autumn", "banjo", "beaver", "bedlamp", "blowtorch",
    "bookshelf", "breakup", "buzzard", "candle", "caravan", "cement", "chisel", "classic",
    "clockwork", "cobra", "compass", "crumpled", "cubic", "dashboard", "decimal", "drifter",
    "dropper", "eating", "egghead", "embezzle", "equation", "fallout", "fireside", "flagpole",
    "framework", "gazelle", "glitter", "goldfish", "graduate", "guitarist", "hamlet", "hazardous",
    "headwaters", "hydraulic", "inception", "island", "jawbone", "jupiter", "keyboard", "klaxon",
    "lantern", "liberty", "locust", "meridian", "midsummer", "molasses", "monument", "necklace",
    "newsletter", "oatmeal", "offload", "orca", "paperweight", "pedigree", "pioneer", "playhouse",
    "quadrant", "quiver", "reindeer", "revenge", "ribcage", "rocker", "sailboat", "scallion",
    "snapshot", "spellbind", "stairway", "sterling", "tactics", "telephone", "tracker",
    "treadmill", "tumor", "umpire", "uncut", "unravel", "vacancy", "village", "voyager",
    "waffle", "wallet", "whimsical", "wichita", "yesteryear", "zulu",
];

struct Offer {
    name: String,
    size: u64,
    kind: PayloadKind,
    stream: ByteStream,
    completion: oneshot::Sender<TransferOutcome>,
}

type Offers = Mutex<HashMap<String, Offer>>;

fn lock(offers: &Offers) -> MutexGuard<'_, HashMap<String, Offer>> {
    offers.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MailboxBackend {
    offers: Arc<Offers>,
    nameplate: AtomicU32,
}

impl Default for MailboxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxBackend {
    pub fn new() -> Self {
        Self {
            offers: Arc::new(Mutex::new(HashMap::new())),
            nameplate: AtomicU32::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Offer>> {
        lock(&self.offers)
    }

    /// Number of offers still waiting for a receiver
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn generate_code(&self) -> String {
        let nameplate = self.nameplate.fetch_add(1, Ordering::Relaxed) + 1;
        let mut rng = rand::rng();
        let first = CODE_WORDS[rng.random_range(0..CODE_WORDS.len())];
        let second = CODE_WORDS[rng.random_range(0..CODE_WORDS.len())];
        format!("{nameplate}-{first}-{second}")
    }

    fn offer(&self, name: String, size: u64, kind: PayloadKind, stream: ByteStream) -> PendingTransfer {
        let (tx, rx) = oneshot::channel();
        let code = self.generate_code();
        self.lock().insert(
            code.clone(),
            Offer {
                name,
                size,
                kind,
                stream,
                completion: tx,
            },
        );
        tracing::debug!(%code, size, "Offer registered");

        let offers: Weak<Offers> = Arc::downgrade(&self.offers);
        let key = code.clone();
        PendingTransfer::new(code, rx).on_drop(move || {
            let Some(offers) = offers.upgrade() else {
                return;
            };
            let withdrawn = lock(&offers).remove(&key);
            if withdrawn.is_some() {
                tracing::debug!(code = %key, "Unclaimed offer withdrawn");
            }
        })
    }
}

#[async_trait]
impl TransferBackend for MailboxBackend {
    async fn send_text(&self, text: String) -> Result<PendingTransfer, BackendError> {
        let bytes = text.into_bytes();
        let size = bytes.len() as u64;
        Ok(self.offer(String::new(), size, PayloadKind::Text, Box::new(Cursor::new(bytes))))
    }

    async fn send_file(
        &self,
        name: String,
        size: u64,
        stream: ByteStream,
    ) -> Result<PendingTransfer, BackendError> {
        Ok(self.offer(name, size, PayloadKind::File, stream))
    }

    async fn receive(&self, code: &str) -> Result<IncomingMessage, BackendError> {
        let key = code.to_ascii_lowercase();
        let offer = self
            .lock()
            .remove(&key)
            .ok_or_else(|| BackendError::UnknownCode(code.to_string()))?;

        // The sender gave up (e.g. on shutdown) before anyone claimed it
        if offer.completion.is_closed() {
            return Err(BackendError::Remote("sender is no longer available".to_string()));
        }

        tracing::debug!(code = %key, size = offer.size, "Offer claimed");
        let reader = CompletionReader {
            inner: offer.stream,
            completion: Some(offer.completion),
        };
        Ok(IncomingMessage::new(
            offer.name,
            offer.size,
            offer.kind,
            Box::new(reader),
        ))
    }
}

/// Reports the sender's outcome once the receiver finishes reading
struct CompletionReader {
    inner: ByteStream,
    completion: Option<oneshot::Sender<TransferOutcome>>,
}

impl CompletionReader {
    fn finish(&mut self, outcome: TransferOutcome) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl AsyncRead for CompletionReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let wants_bytes = buf.remaining() > 0;

        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        match &poll {
            Poll::Ready(Ok(())) if wants_bytes && buf.filled().len() == before => {
                this.finish(TransferOutcome::success());
            }
            Poll::Ready(Err(e)) => {
                this.finish(TransferOutcome::failure(e.to_string()));
            }
            _ => {}
        }
        poll
    }
}

impl Drop for CompletionReader {
    fn drop(&mut self) {
        self.finish(TransferOutcome::failure("receiver disconnected"));
    }
}
