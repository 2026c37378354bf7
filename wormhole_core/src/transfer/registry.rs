//! Source of truth for transfer records
//!
//! Every `set` is published while the write lock is held, and `subscribe`
//! reads its snapshot under the read lock. A new subscriber therefore sees
//! the current snapshot, then the latest state after every later `set`.
//!
//! Each record carries a cancellation token. `delete` fires it, so the task
//! driving that transfer stops, and `update` refuses ids that are gone, so a
//! removed record is never brought back.

use super::broadcaster::{Broadcaster, Subscription};
use super::record::TransferRecord;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

struct Entry {
    record: TransferRecord,
    cancel: CancellationToken,
}

pub struct TransferRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    broadcaster: Arc<Broadcaster>,
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            broadcaster: Arc::new(Broadcaster::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<TransferRecord> {
        self.read().get(id).map(|entry| entry.record.clone())
    }

    /// Register a new transfer. The returned token fires when the record is
    /// deleted or `parent` is cancelled.
    pub fn insert(&self, mut record: TransferRecord, parent: &CancellationToken) -> CancellationToken {
        record.updated_at = SystemTime::now();
        let cancel = parent.child_token();
        let replaced = {
            let mut entries = self.write();
            self.broadcaster.publish(&record);
            entries.insert(
                record.id.clone(),
                Entry {
                    record,
                    cancel: cancel.clone(),
                },
            )
        };
        if let Some(old) = replaced {
            old.cancel.cancel();
        }
        cancel
    }

    /// Insert or replace a record and notify its subscribers
    pub fn set(&self, mut record: TransferRecord) {
        record.updated_at = SystemTime::now();
        let mut entries = self.write();
        self.broadcaster.publish(&record);
        match entries.get_mut(&record.id) {
            Some(entry) => entry.record = record,
            None => {
                entries.insert(
                    record.id.clone(),
                    Entry {
                        record,
                        cancel: CancellationToken::new(),
                    },
                );
            }
        }
    }

    /// Replace an existing record and notify its subscribers. Returns
    /// `false`, and changes nothing, if the id is no longer registered.
    pub fn update(&self, mut record: TransferRecord) -> bool {
        record.updated_at = SystemTime::now();
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(&record.id) else {
            return false;
        };
        self.broadcaster.publish(&record);
        entry.record = record;
        true
    }

    /// Remove a record and cancel the task driving it. Its subscribers are
    /// dropped, which closes their connections.
    pub fn delete(&self, id: &str) -> Option<TransferRecord> {
        let removed = self.write().remove(id);
        self.broadcaster.forget(id);
        removed.map(|entry| {
            entry.cancel.cancel();
            entry.record
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Subscribe to a transfer's updates, starting with its current snapshot
    pub fn subscribe(&self, id: &str) -> Subscription {
        let entries = self.read();
        self.broadcaster
            .subscribe(id, entries.get(id).map(|entry| &entry.record))
    }

    /// Clone of every record, for periodic scans
    pub fn records(&self) -> Vec<TransferRecord> {
        self.read()
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}
