//! HTTP and WebSocket surface for the web client
//!
//! JSON endpoints start transfers and report their status, `/api/ws`
//! streams record snapshots, `/api/download` serves received files.

pub mod handlers;
pub mod messages;
pub mod server;
pub mod websocket;

pub use server::{create_router, serve};
