//! Live status stream for one transfer
//!
//! After the upgrade the client gets the current record, then every later
//! change, as JSON text frames. Incoming messages are ignored apart from
//! close.

use super::handlers::require_id;
use super::messages::IdQuery;
use crate::error::ApiError;
use crate::state::AppState;
use crate::transfer::Subscription;
use crate::transfer::constants::WS_WRITE_TIMEOUT;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ping interval for keeping idle connections alive through proxies
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler
///
/// The id is checked before upgrading so bad requests get a plain HTTP
/// error instead of a socket that closes immediately.
pub async fn ws_upgrade_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let id = require_id(query)?;
    if state.registry.get(&id).is_none() {
        return Err(ApiError::NotFound("Transfer not found"));
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let subscription = state.registry.subscribe(&id);
    let shutdown = state.shutdown.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, shutdown)))
}

/// Send with the per-write deadline. Returns false if the client is gone
/// or too slow.
async fn send_bounded(
    sender: &mut SplitSink<WebSocket, Message>,
    message: Message,
    transfer_id: &str,
) -> bool {
    match tokio::time::timeout(WS_WRITE_TIMEOUT, sender.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(transfer_id, "WebSocket send failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!(transfer_id, "WebSocket write timed out, closing connection");
            false
        }
    }
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription, shutdown: CancellationToken) {
    let transfer_id = subscription.transfer_id().to_string();
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(transfer_id, "WebSocket subscriber connected");

    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                // `None`: the record was deleted or this subscriber was pruned
                let Some(frame) = frame else { break };
                if !send_bounded(&mut sender, Message::Text(frame.to_string().into()), &transfer_id).await {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(transfer_id, "WebSocket receive error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = ping_interval.tick() => {
                if !send_bounded(&mut sender, Message::Ping(bytes::Bytes::new()), &transfer_id).await {
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                let _ = send_bounded(&mut sender, Message::Close(None), &transfer_id).await;
                break;
            }
        }
    }

    drop(subscription);
    let _ = tokio::time::timeout(WS_WRITE_TIMEOUT, sender.close()).await;
    tracing::debug!(transfer_id, "WebSocket subscriber disconnected");
}
