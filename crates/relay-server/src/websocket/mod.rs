//! WebSocket gateway: framing, per-client connection state and the
//! session loop.

pub mod connection;
pub mod frames;
pub mod handler;
pub mod session;
