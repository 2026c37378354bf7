mod common;

use common::{GatedBackend, StalledBackend, TestApp, app_with, multipart_request};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wormhole_core::transfer::LifecycleSweeper;
use wormhole_core::{
    Direction, MailboxBackend, Storage, TransferBackend, TransferRecord, TransferRegistry,
    TransferState,
};

const HOUR: Duration = Duration::from_secs(60 * 60);

fn app_sweeper(app: &TestApp) -> LifecycleSweeper {
    LifecycleSweeper::new(
        Arc::clone(&app.state.registry),
        app.state.storage.clone(),
        HOUR,
        Duration::from_secs(5 * 60),
    )
}

#[tokio::test]
async fn test_sweep_removes_expired_record_and_directory() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path());
    let registry = Arc::new(TransferRegistry::new());
    let now = SystemTime::now();

    let mut old = TransferRecord::new("recv-1", Direction::Receive);
    old.advance(TransferState::Complete);
    old.created_at = now - Duration::from_secs(2 * 60 * 60);
    registry.set(old);
    let old_dir = storage.create_transfer_dir("recv-1").await.unwrap();
    tokio::fs::write(old_dir.join("photo.jpg"), b"jpeg").await.unwrap();

    let fresh = TransferRecord::new("recv-2", Direction::Receive);
    registry.set(fresh);
    let fresh_dir = storage.create_transfer_dir("recv-2").await.unwrap();

    let sweeper = LifecycleSweeper::new(
        Arc::clone(&registry),
        storage,
        Duration::from_secs(60 * 60),
        Duration::from_secs(5 * 60),
    );
    let removed = sweeper.sweep(now).await;

    assert_eq!(removed, vec!["recv-1".to_string()]);
    assert!(registry.get("recv-1").is_none());
    assert!(!old_dir.exists());
    assert!(registry.get("recv-2").is_some());
    assert!(fresh_dir.exists());
}

#[tokio::test]
async fn test_sweep_keeps_slow_transfer_that_is_still_moving() {
    let root = tempfile::tempdir().unwrap();
    let registry = Arc::new(TransferRegistry::new());
    let now = SystemTime::now();

    // Started long ago but `set` just stamped it as updated
    let mut slow = TransferRecord::new("recv-3", Direction::Receive);
    slow.created_at = now - Duration::from_secs(3 * 60 * 60);
    registry.set(slow);

    let sweeper = LifecycleSweeper::new(
        Arc::clone(&registry),
        Storage::new(root.path()),
        Duration::from_secs(60 * 60),
        Duration::from_secs(5 * 60),
    );
    assert!(sweeper.sweep(now).await.is_empty());

    let later = now + Duration::from_secs(2 * 60 * 60);
    assert_eq!(sweeper.sweep(later).await, vec!["recv-3".to_string()]);
}

#[tokio::test]
async fn test_sweep_closes_subscriptions() {
    let root = tempfile::tempdir().unwrap();
    let registry = Arc::new(TransferRegistry::new());
    let now = SystemTime::now();

    let mut done = TransferRecord::new("send-9", Direction::Send);
    done.advance(TransferState::Error);
    done.created_at = now - Duration::from_secs(7200);
    registry.set(done);

    let mut subscription = registry.subscribe("send-9");
    assert!(subscription.recv().await.is_some());

    let sweeper = LifecycleSweeper::new(
        Arc::clone(&registry),
        Storage::new(root.path()),
        Duration::from_secs(3600),
        Duration::from_secs(300),
    );
    sweeper.sweep(now).await;
    assert!(subscription.recv().await.is_none());
}

#[tokio::test]
async fn test_spawned_sweeper_stops_on_shutdown() {
    let root = tempfile::tempdir().unwrap();
    let registry = Arc::new(TransferRegistry::new());
    let shutdown = tokio_util::sync::CancellationToken::new();
    let tracker = tokio_util::task::TaskTracker::new();

    LifecycleSweeper::new(
        registry,
        Storage::new(root.path()),
        Duration::from_secs(3600),
        Duration::from_secs(300),
    )
    .spawn(shutdown.clone(), &tracker);

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    tracker.close();
    tracker.wait().await;
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn test_swept_send_stays_gone_after_late_claim() {
    let backend = Arc::new(MailboxBackend::new());
    let app = app_with(backend.clone()).await;

    let id = app.start("/api/send/text", r#"{"text":"hi"}"#).await;
    let (waiting, _) = app
        .wait_for(&id, |r| r.state == TransferState::Waiting)
        .await;
    let code = waiting.exchange_code.unwrap();

    let removed = app_sweeper(&app)
        .sweep(SystemTime::now() + 2 * HOUR)
        .await;
    assert_eq!(removed, vec![id.clone()]);
    assert!(app.state.registry.get(&id).is_none());

    // A receiver that shows up afterwards must not bring the record back
    if let Ok(mut message) = backend.receive(&code).await {
        let mut bytes = Vec::new();
        let _ = message.read_to_end(&mut bytes).await;
    }

    assert!(app.state.drain(Duration::from_secs(5)).await);
    assert!(app.state.registry.get(&id).is_none());
    assert_eq!(backend.pending(), 0);
}

#[tokio::test]
async fn test_swept_file_send_releases_its_files() {
    let backend = Arc::new(MailboxBackend::new());
    let app = app_with(backend.clone()).await;

    let (status, body) = app
        .request(multipart_request(&[("file", Some("big.bin"), b"0123456789")]))
        .await;
    assert_eq!(status.as_u16(), 200, "{body}");
    let created: serde_json::Value = serde_json::from_str(&body).unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let (waiting, _) = app
        .wait_for(&id, |r| r.state == TransferState::Waiting)
        .await;
    let dir = app.state.storage.transfer_dir(&id).unwrap();

    app_sweeper(&app)
        .sweep(SystemTime::now() + 2 * HOUR)
        .await;
    assert!(app.state.drain(Duration::from_secs(5)).await);

    assert!(app.state.registry.get(&id).is_none());
    assert!(!dir.exists());
    assert_eq!(backend.pending(), 0);
    assert!(backend.receive(&waiting.exchange_code.unwrap()).await.is_err());
}

#[tokio::test]
async fn test_swept_receive_waiting_on_backend_stops() {
    let app = app_with(Arc::new(StalledBackend)).await;
    let id = app
        .start("/api/receive", r#"{"code":"4-slow-relay"}"#)
        .await;

    let removed = app_sweeper(&app)
        .sweep(SystemTime::now() + 2 * HOUR)
        .await;
    assert_eq!(removed, vec![id.clone()]);

    // The task would otherwise wait on the backend forever
    assert!(app.state.drain(Duration::from_secs(5)).await);
    assert!(app.state.registry.get(&id).is_none());
}

#[tokio::test]
async fn test_swept_receive_mid_write_stays_gone() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let app = app_with(Arc::new(GatedBackend::new(reader, 10))).await;
    let id = app
        .start("/api/receive", r#"{"code":"4-gated-relay"}"#)
        .await;

    writer.write_all(b"0123").await.unwrap();
    app.wait_for(&id, |r| r.bytes_transferred == 4).await;
    let dir = app.state.storage.transfer_dir(&id).unwrap();
    assert!(dir.join("notes.txt").exists());

    app_sweeper(&app)
        .sweep(SystemTime::now() + 2 * HOUR)
        .await;

    // The backend finishes regardless; the reader may already be gone
    let _ = writer.write_all(b"456789").await;
    drop(writer);

    assert!(app.state.drain(Duration::from_secs(5)).await);
    assert!(app.state.registry.get(&id).is_none());
    assert!(!dir.exists());
}
