#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wormhole_core::backend::{ByteStream, IncomingMessage, PayloadKind, PendingTransfer};
use wormhole_core::http_share::create_router;
use wormhole_core::{
    AppState, BackendError, MailboxBackend, ServerConfig, TransferBackend, TransferRecord,
};

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub storage: TempDir,
}

pub async fn app_with(backend: Arc<dyn TransferBackend>) -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        storage_dir: storage.path().join("transfers"),
        ..ServerConfig::default()
    };
    let state = Arc::new(
        AppState::new(config, backend, CancellationToken::new())
            .await
            .unwrap(),
    );
    let router = create_router(Arc::clone(&state));
    TestApp {
        state,
        router,
        storage,
    }
}

pub async fn app() -> TestApp {
    app_with(Arc::new(MailboxBackend::new())).await
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, String) {
        self.request(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Start a transfer and return its id
    pub async fn start(&self, uri: &str, body: &str) -> String {
        let (status, body) = self.post_json(uri, body).await;
        assert_eq!(status, StatusCode::OK, "unexpected response: {body}");
        let created: serde_json::Value = serde_json::from_str(&body).unwrap();
        created["id"].as_str().unwrap().to_string()
    }

    /// Poll `/api/status` until `done` holds, returning every distinct
    /// status seen on the way.
    pub async fn wait_for(
        &self,
        id: &str,
        done: impl Fn(&TransferRecord) -> bool,
    ) -> (TransferRecord, Vec<String>) {
        let mut seen: Vec<String> = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (status, body) = self.get(&format!("/api/status?id={id}")).await;
            assert_eq!(status, StatusCode::OK, "status failed: {body}");
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            let state = json["status"].as_str().unwrap().to_string();
            if seen.last() != Some(&state) {
                seen.push(state);
            }

            let record: TransferRecord = serde_json::from_value(json).unwrap();
            if done(&record) {
                return (record, seen);
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting on {id}, saw {seen:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, contents) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

pub fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let boundary = "wormhole-test-boundary";
    Request::post("/api/send/file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(boundary, parts)))
        .unwrap()
}

/// Backend whose relay is never reachable
pub struct UnreachableBackend;

#[async_trait]
impl TransferBackend for UnreachableBackend {
    async fn send_text(&self, _text: String) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("relay unreachable".to_string()))
    }

    async fn send_file(
        &self,
        _name: String,
        _size: u64,
        _stream: ByteStream,
    ) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("relay unreachable".to_string()))
    }

    async fn receive(&self, _code: &str) -> Result<IncomingMessage, BackendError> {
        Err(BackendError::Remote("relay unreachable".to_string()))
    }
}

/// Backend whose receives never find their sender
pub struct StalledBackend;

#[async_trait]
impl TransferBackend for StalledBackend {
    async fn send_text(&self, _text: String) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("sending is not supported".to_string()))
    }

    async fn send_file(
        &self,
        _name: String,
        _size: u64,
        _stream: ByteStream,
    ) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("sending is not supported".to_string()))
    }

    async fn receive(&self, _code: &str) -> Result<IncomingMessage, BackendError> {
        std::future::pending().await
    }
}

/// Backend that hands out one file whose bytes the test writes itself
pub struct GatedBackend {
    reader: std::sync::Mutex<Option<tokio::io::DuplexStream>>,
    size: u64,
}

impl GatedBackend {
    pub fn new(reader: tokio::io::DuplexStream, size: u64) -> Self {
        Self {
            reader: std::sync::Mutex::new(Some(reader)),
            size,
        }
    }
}

#[async_trait]
impl TransferBackend for GatedBackend {
    async fn send_text(&self, _text: String) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("sending is not supported".to_string()))
    }

    async fn send_file(
        &self,
        _name: String,
        _size: u64,
        _stream: ByteStream,
    ) -> Result<PendingTransfer, BackendError> {
        Err(BackendError::Remote("sending is not supported".to_string()))
    }

    async fn receive(&self, code: &str) -> Result<IncomingMessage, BackendError> {
        let reader = self
            .reader
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BackendError::UnknownCode(code.to_string()))?;
        Ok(IncomingMessage::new(
            "notes.txt",
            self.size,
            PayloadKind::File,
            Box::new(reader),
        ))
    }
}
