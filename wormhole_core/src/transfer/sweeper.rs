//! Periodic removal of expired transfers and their files

use super::record::TransferRecord;
use super::registry::TransferRegistry;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct LifecycleSweeper {
    registry: Arc<TransferRegistry>,
    storage: Storage,
    ttl: Duration,
    interval: Duration,
}

impl LifecycleSweeper {
    pub fn new(
        registry: Arc<TransferRegistry>,
        storage: Storage,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            ttl,
            interval,
        }
    }

    /// Finished transfers expire by age. Running ones only expire once they
    /// have gone quiet for longer than the retention window.
    pub fn is_expired(&self, record: &TransferRecord, now: SystemTime) -> bool {
        let since = if record.state.is_terminal() {
            record.created_at
        } else {
            record.updated_at
        };
        now.duration_since(since)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    /// Remove every record expired at `now`, then its directory.
    /// Returns the removed ids.
    pub async fn sweep(&self, now: SystemTime) -> Vec<String> {
        let expired: Vec<String> = self
            .registry
            .records()
            .into_iter()
            .filter(|record| self.is_expired(record, now))
            .map(|record| record.id)
            .collect();

        for id in &expired {
            self.registry.delete(id);
            self.storage.remove_transfer_dir(id).await;
            tracing::info!(transfer_id = %id, "Cleaned up expired transfer");
        }
        expired
    }

    /// Run `sweep` every interval until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken, tracker: &TaskTracker) {
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep(SystemTime::now()).await;
                        if !removed.is_empty() {
                            tracing::debug!(count = removed.len(), "Sweep finished");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::debug!("Sweeper stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::record::{Direction, TransferState};

    fn sweeper(ttl: Duration) -> LifecycleSweeper {
        LifecycleSweeper::new(
            Arc::new(TransferRegistry::new()),
            Storage::new(std::env::temp_dir().join("wormhole-web-sweeper-unit")),
            ttl,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_terminal_records_expire_by_creation_time() {
        let sweeper = sweeper(Duration::from_secs(60));
        let now = SystemTime::now();
        let mut record = TransferRecord::new("recv-9", Direction::Receive);
        record.advance(TransferState::Complete);
        record.created_at = now - Duration::from_secs(120);
        record.updated_at = now;
        assert!(sweeper.is_expired(&record, now));
    }

    #[test]
    fn test_active_records_expire_only_when_idle() {
        let sweeper = sweeper(Duration::from_secs(60));
        let now = SystemTime::now();
        let mut record = TransferRecord::new("recv-1", Direction::Receive);
        record.created_at = now - Duration::from_secs(600);
        record.updated_at = now - Duration::from_secs(10);
        assert!(!sweeper.is_expired(&record, now));

        record.updated_at = now - Duration::from_secs(120);
        assert!(sweeper.is_expired(&record, now));
    }

    #[test]
    fn test_future_timestamps_are_not_expired() {
        let sweeper = sweeper(Duration::from_secs(60));
        let now = SystemTime::now();
        let mut record = TransferRecord::new("send-2", Direction::Send);
        record.advance(TransferState::Error);
        record.created_at = now + Duration::from_secs(30);
        assert!(!sweeper.is_expired(&record, now));
    }
}
