//! Mission relay: membership tracking, connect/join/disconnect handling
//! and command routing on top of a [`RoomTransport`].

pub mod lifecycle;
pub mod membership;
pub mod router;

use std::sync::Arc;

use relay_core::{DeviceId, MissionId};
use thiserror::Error;

use crate::transport::{RoomTransport, TransportError};
use membership::MembershipIndex;

/// Everything a relay operation needs.
pub struct RelayContext {
    /// Room transport.
    pub transport: Arc<dyn RoomTransport>,
    /// Reverse device → missions index.
    pub membership: MembershipIndex,
}

impl RelayContext {
    /// Context over `transport` with an empty index.
    pub fn new(transport: Arc<dyn RoomTransport>) -> Self {
        Self {
            transport,
            membership: MembershipIndex::new(),
        }
    }
}

/// Failure of a relay operation.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The payload did not match its schema. Carries every violation.
    #[error("{0}")]
    InvalidPayload(String),
    /// The target device is not in the mission's room.
    #[error("Device {device_id} not found in mission {mission_id}")]
    DeviceNotInMission {
        /// Target device.
        device_id: DeviceId,
        /// Mission named in the request.
        mission_id: MissionId,
    },
    /// The transport failed while enumerating or delivering.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RelayError {
    /// Whether the error belongs in an error ack rather than propagating.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::DeviceNotInMission { .. } => "not_found",
            Self::Transport(_) => "transport",
        }
    }
}
