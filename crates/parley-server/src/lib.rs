//! # parley-server
//!
//! Axum HTTP + `WebSocket` boundary of the Parley relay.
//!
//! - `GET /signal/{group_code}?user=<uuid>`: admission checks, upgrade,
//!   and hand-off to a connection lifecycle
//! - `GET /health`, `GET /metrics`
//! - Per-connection heartbeat
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ParleyServer};
