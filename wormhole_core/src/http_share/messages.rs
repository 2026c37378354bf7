//! Request and response bodies

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendTextRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReceiveRequest {
    pub code: String,
}

/// Returned by every endpoint that starts a transfer
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferCreated {
    pub id: String,
}

/// `?id=` on the status and WebSocket endpoints
#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}
