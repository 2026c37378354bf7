//! Per-transfer fan-out of record snapshots
//!
//! Each subscriber holds a single slot with the newest snapshot. Publishing
//! replaces that slot and never waits, so a slow reader cannot hold up the
//! task that mutated the record. A reader that falls behind skips stale
//! snapshots but always ends on the latest one, including the terminal one.

use super::record::TransferRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

/// Serialized snapshot shared by every subscriber of one publish
pub type Frame = Arc<str>;

type Sinks = HashMap<Uuid, watch::Sender<Option<Frame>>>;

#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<String, Sinks>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Sinks>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a sink for `transfer_id`, delivering `snapshot` to it first.
    pub fn subscribe(
        self: &Arc<Self>,
        transfer_id: &str,
        snapshot: Option<&TransferRecord>,
    ) -> Subscription {
        let first = snapshot.and_then(encode);
        let has_snapshot = first.is_some();
        let (tx, mut rx) = watch::channel(first);
        if has_snapshot {
            rx.mark_changed();
        }

        let subscriber_id = Uuid::new_v4();
        self.lock()
            .entry(transfer_id.to_string())
            .or_default()
            .insert(subscriber_id, tx);
        tracing::debug!(transfer_id, %subscriber_id, "Subscriber added");

        Subscription {
            transfer_id: transfer_id.to_string(),
            subscriber_id,
            receiver: rx,
            broadcaster: Arc::clone(self),
        }
    }

    pub fn unsubscribe(&self, transfer_id: &str, subscriber_id: Uuid) {
        let mut subscribers = self.lock();
        if let Some(sinks) = subscribers.get_mut(transfer_id) {
            sinks.remove(&subscriber_id);
            if sinks.is_empty() {
                subscribers.remove(transfer_id);
            }
        }
    }

    /// Deliver a snapshot to every subscriber of the record's transfer.
    pub fn publish(&self, record: &TransferRecord) {
        let mut subscribers = self.lock();
        let Some(sinks) = subscribers.get_mut(&record.id) else {
            return;
        };
        let Some(frame) = encode(record) else {
            return;
        };

        sinks.retain(|subscriber_id, tx| {
            if tx.is_closed() {
                tracing::debug!(transfer_id = %record.id, %subscriber_id, "Dropping closed subscriber");
                return false;
            }
            tx.send_replace(Some(Arc::clone(&frame)));
            true
        });

        if sinks.is_empty() {
            subscribers.remove(&record.id);
        }
    }

    /// Drop every subscriber of a transfer. Their streams end once they
    /// have read the last snapshot.
    pub fn forget(&self, transfer_id: &str) {
        self.lock().remove(transfer_id);
    }

    pub fn subscriber_count(&self, transfer_id: &str) -> usize {
        self.lock().get(transfer_id).map_or(0, HashMap::len)
    }
}

fn encode(record: &TransferRecord) -> Option<Frame> {
    match serde_json::to_string(record) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            tracing::error!(transfer_id = %record.id, "Failed to serialize transfer record: {}", e);
            None
        }
    }
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    transfer_id: String,
    subscriber_id: Uuid,
    receiver: watch::Receiver<Option<Frame>>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    /// Newest snapshot not yet seen, or `None` once the subscriber has been
    /// dropped and nothing is left to read
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(frame) = self.receiver.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Newest snapshot if one arrived since the last read
    pub fn try_recv(&mut self) -> Option<Frame> {
        let current = self.receiver.borrow_and_update();
        if current.has_changed() {
            current.clone()
        } else {
            None
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster
            .unsubscribe(&self.transfer_id, self.subscriber_id);
    }
}
