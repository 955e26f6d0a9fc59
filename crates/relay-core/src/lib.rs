//! # relay-core
//!
//! Transport-independent building blocks of the mission relay.
//!
//! - Opaque identifiers for connections, devices and missions
//! - Connection identity and handshake classification
//! - The success/error acknowledgement envelope
//! - The event catalogue with inbound payloads and outbound events
//! - Payload schemas and the validator that guards every handler

#![deny(unsafe_code)]

pub mod ack;
pub mod events;
pub mod identity;
pub mod ids;
pub mod schema;

pub use ack::Ack;
pub use identity::{Identity, Role, classify};
pub use ids::{ConnectionId, DeviceId, MissionId, Room};
pub use schema::{Payload, Schema, Validation};
