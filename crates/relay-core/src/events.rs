//! Event catalogue: names, inbound payloads, outbound events and ack data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::ids::{ConnectionId, DeviceId, MissionId};
use crate::schema::{FieldKind, Payload, Schema};

/// Event names as they appear on the wire.
pub mod names {
    /// Join one or more mission rooms (client→server).
    pub const JOIN_MISSION_ROOMS: &str = "join-mission-rooms";
    /// Point-to-point device command (client→server, server→device).
    pub const DEVICE_COMMAND: &str = "device-command";
    /// Device status report (client→server, server→room).
    pub const DEVICE_STATUS_UPDATE: &str = "device-status-update";
    /// Mission-wide command (client→server, server→room).
    pub const SEND_MISSION_COMMAND: &str = "send-mission-command";
    /// A device joined a mission room (server→room).
    pub const DEVICE_JOINED_MISSION: &str = "device-joined-mission";
    /// A device left a mission room (server→room).
    pub const DEVICE_LEFT_MISSION: &str = "device-left-mission";
    /// Liveness probe (client→server).
    pub const PING: &str = "ping";
    /// Greeting sent right after the socket opens (server→client).
    pub const CONNECTED: &str = "connected";
}

/// Sender label used when a command omits `from`.
pub const DEFAULT_COMMAND_SOURCE: &str = "controller";

// ─────────────────────────────────────────────────────────────────────────────
// Inbound payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `join-mission-rooms` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinMissionRooms {
    /// Missions to join, at least one.
    pub missions: Vec<MissionId>,
}

impl Payload for JoinMissionRooms {
    fn schema() -> Schema {
        Schema::object().required("missions", FieldKind::TextList)
    }
}

/// `device-command` payload as sent by a controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    /// Mission the target device must belong to.
    pub mission_id: MissionId,
    /// Target device.
    pub device_id: DeviceId,
    /// Opaque command string.
    pub command: String,
    /// Sender label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Payload for DeviceCommand {
    fn schema() -> Schema {
        Schema::object()
            .required("missionId", FieldKind::Text)
            .required("deviceId", FieldKind::Text)
            .required("command", FieldKind::Text)
            .optional("from", FieldKind::Text)
    }
}

/// `device-status-update` payload. Relayed to the room verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusUpdate {
    /// Mission room to broadcast to.
    pub mission_id: MissionId,
    /// Reporting device.
    pub device_id: DeviceId,
    /// Opaque status string.
    pub status: String,
    /// Client timestamp, strictly positive.
    pub timestamp: u64,
}

impl Payload for DeviceStatusUpdate {
    fn schema() -> Schema {
        Schema::object()
            .required("missionId", FieldKind::Text)
            .required("deviceId", FieldKind::Text)
            .required("status", FieldKind::Text)
            .required("timestamp", FieldKind::PositiveInt)
    }
}

/// `send-mission-command` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMissionCommand {
    /// Mission room to broadcast to.
    pub mission_id: MissionId,
    /// Opaque command string.
    pub command: String,
    /// Sender label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Payload for SendMissionCommand {
    fn schema() -> Schema {
        Schema::object()
            .required("missionId", FieldKind::Text)
            .required("command", FieldKind::Text)
            .optional("from", FieldKind::Text)
    }
}

/// `ping` payload, a bare string echoed back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ping(pub String);

impl Payload for Ping {
    fn schema() -> Schema {
        Schema::Text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound events
// ─────────────────────────────────────────────────────────────────────────────

/// Command delivered to a device's personal channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommandEvent {
    /// Mission the command was issued under.
    pub mission_id: MissionId,
    /// Target device.
    pub device_id: DeviceId,
    /// Opaque command string.
    pub command: String,
    /// Sender label, defaulted.
    pub from: String,
}

impl From<DeviceCommand> for DeviceCommandEvent {
    fn from(cmd: DeviceCommand) -> Self {
        Self {
            mission_id: cmd.mission_id,
            device_id: cmd.device_id,
            command: cmd.command,
            from: cmd
                .from
                .unwrap_or_else(|| DEFAULT_COMMAND_SOURCE.to_owned()),
        }
    }
}

/// Command broadcast to a whole mission room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionCommandEvent {
    /// Mission room.
    pub mission_id: MissionId,
    /// Opaque command string.
    pub command: String,
    /// Sender label, defaulted.
    pub from: String,
}

impl From<SendMissionCommand> for MissionCommandEvent {
    fn from(cmd: SendMissionCommand) -> Self {
        Self {
            mission_id: cmd.mission_id,
            command: cmd.command,
            from: cmd
                .from
                .unwrap_or_else(|| DEFAULT_COMMAND_SOURCE.to_owned()),
        }
    }
}

/// A device entered or left a mission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionPresence {
    /// Mission room.
    pub mission_id: MissionId,
    /// Device that joined or left.
    pub device_id: DeviceId,
}

/// Greeting carried by the `connected` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedInfo {
    /// Server-assigned connection id.
    pub connection_id: ConnectionId,
    /// Identity decided from the handshake.
    pub identity: Identity,
    /// RFC 3339 server time.
    pub timestamp: String,
}

/// Every event the server pushes to clients, framed as
/// `{"event": <name>, "data": <payload>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// See [`names::DEVICE_COMMAND`].
    #[serde(rename = "device-command")]
    DeviceCommand(DeviceCommandEvent),
    /// See [`names::DEVICE_STATUS_UPDATE`].
    #[serde(rename = "device-status-update")]
    DeviceStatusUpdate(DeviceStatusUpdate),
    /// See [`names::SEND_MISSION_COMMAND`].
    #[serde(rename = "send-mission-command")]
    MissionCommand(MissionCommandEvent),
    /// See [`names::DEVICE_JOINED_MISSION`].
    #[serde(rename = "device-joined-mission")]
    DeviceJoinedMission(MissionPresence),
    /// See [`names::DEVICE_LEFT_MISSION`].
    #[serde(rename = "device-left-mission")]
    DeviceLeftMission(MissionPresence),
    /// See [`names::CONNECTED`].
    #[serde(rename = "connected")]
    Connected(ConnectedInfo),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceCommand(_) => names::DEVICE_COMMAND,
            Self::DeviceStatusUpdate(_) => names::DEVICE_STATUS_UPDATE,
            Self::MissionCommand(_) => names::SEND_MISSION_COMMAND,
            Self::DeviceJoinedMission(_) => names::DEVICE_JOINED_MISSION,
            Self::DeviceLeftMission(_) => names::DEVICE_LEFT_MISSION,
            Self::Connected(_) => names::CONNECTED,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ack data
// ─────────────────────────────────────────────────────────────────────────────

/// Ack data of `join-mission-rooms`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinMissionRoomsAck {
    /// Missions joined, in request order without duplicates.
    pub joined: Vec<MissionId>,
    /// Devices currently in each joined mission room.
    pub devices: BTreeMap<MissionId, Vec<DeviceId>>,
}

/// Ack data of `device-command` and `send-mission-command`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredTo {
    /// Device id for unicast, `room:<missionId>` for broadcast.
    pub delivered_to: String,
}

impl DeliveredTo {
    /// Unicast to a device.
    pub fn device(device_id: &DeviceId) -> Self {
        Self {
            delivered_to: device_id.to_string(),
        }
    }

    /// Broadcast to a mission room.
    pub fn room(mission_id: &MissionId) -> Self {
        Self {
            delivered_to: format!("room:{mission_id}"),
        }
    }
}

/// Ack data of `device-status-update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReceived {
    /// Always `true`.
    pub received: bool,
}

/// Ack data of `ping`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    /// The echoed ping payload.
    pub pong: String,
}
