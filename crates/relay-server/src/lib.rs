//! # relay-server
//!
//! WebSocket gateway for the mission relay.
//!
//! - `/socket` endpoint: handshake classification, framed events and acks
//! - In-memory room transport with per-connection outbound queues
//! - Reverse device → missions index guarded per device
//! - Join/leave announcements and command routing
//! - `/health`, `/metrics`, heartbeat and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{RelayServer, ServerHandle};
