//! Room-based transport seen by the relay.
//!
//! The relay never touches sockets or room maps directly; it only joins,
//! broadcasts, unicasts and enumerates through [`RoomTransport`].

mod rooms;

pub use rooms::RoomRegistry;

use async_trait::async_trait;
use relay_core::events::ServerEvent;
use relay_core::{ConnectionId, Identity, Room};
use thiserror::Error;

/// Transport-level failure. Never converted into an ack by the relay.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is not (or no longer) registered.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    /// An outbound event could not be encoded.
    #[error("failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A connection currently in a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomMember {
    /// Member connection.
    pub connection_id: ConnectionId,
    /// Its identity.
    pub identity: Identity,
}

/// Room primitives the relay is built on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Put a connection into a room. Joining twice is a no-op.
    async fn join(&self, connection: &ConnectionId, room: &Room) -> Result<(), TransportError>;

    /// Deliver an event to every member of a room, returning how many
    /// members it was queued for.
    async fn broadcast(&self, room: &Room, event: &ServerEvent) -> Result<usize, TransportError>;

    /// Deliver an event to one connection. `Ok(false)` means it was dropped.
    async fn send_to(
        &self,
        connection: &ConnectionId,
        event: &ServerEvent,
    ) -> Result<bool, TransportError>;

    /// Current members of a room. Unknown rooms are empty.
    async fn members(&self, room: &Room) -> Result<Vec<RoomMember>, TransportError>;
}
