//! Identifier newtypes.
//!
//! Connection ids are minted by the server. Device and mission ids are
//! opaque strings supplied by clients and are never parsed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of a mission room's display name.
pub const MISSION_ROOM_PREFIX: &str = "mission:";

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

opaque_id!(
    /// Unique id of one transport session, `conn_<uuid v7>`.
    ConnectionId
);
opaque_id!(
    /// Stable id of a remote-controlled device.
    DeviceId
);
opaque_id!(
    /// Opaque mission id. A mission exists only as a room name.
    MissionId
);

impl ConnectionId {
    /// Mint a fresh connection id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceId {
    /// The device's personal channel.
    pub fn channel(&self) -> Room {
        Room::Device(self.clone())
    }
}

impl MissionId {
    /// The mission's room.
    pub fn room(&self) -> Room {
        Room::Mission(self.clone())
    }
}

/// A room key.
///
/// Personal channels and mission rooms are separate namespaces, so no
/// device id can ever address a mission room and vice versa.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Room {
    /// Personal channel of one device, named after its id.
    Device(DeviceId),
    /// Shared room of a mission (`mission:<id>`).
    Mission(MissionId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => f.write_str(id.as_str()),
            Self::Mission(id) => write!(f, "{MISSION_ROOM_PREFIX}{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn mission_room_name() {
        let room = MissionId::from("m1").room();
        assert_eq!(room, Room::Mission("m1".into()));
        assert_eq!(room.to_string(), "mission:m1");
    }

    #[test]
    fn device_channel_is_named_after_device() {
        let id = DeviceId::from("drone-7");
        assert_eq!(id.channel(), Room::Device(id.clone()));
        assert_eq!(id.channel().to_string(), "drone-7");
    }

    #[test]
    fn device_named_like_a_mission_room_stays_in_its_own_channel() {
        let device = DeviceId::from("mission:m1");
        let mission = MissionId::from("m1");
        assert_eq!(device.channel().to_string(), mission.room().to_string());
        assert_ne!(device.channel(), mission.room());
    }

    #[test]
    fn serde_transparent() {
        let id = MissionId::from("m1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m1\"");
        let back: DeviceId = serde_json::from_str("\"d1\"").unwrap();
        assert_eq!(back.as_str(), "d1");
    }

    #[test]
    fn ordering_follows_raw_string() {
        let mut ids = vec![MissionId::from("b"), MissionId::from("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
