//! Connection identity and handshake classification.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::DeviceId;

/// Handshake key whose presence marks a device connection.
pub const DEVICE_ID_PARAM: &str = "deviceId";
/// Handshake key naming a controller role.
pub const ROLE_PARAM: &str = "role";

/// Operator role of a controller connection.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control. Assigned when no role is given.
    #[default]
    Admin,
    /// Regular operator.
    User,
    /// Read-mostly observer.
    Guest,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "guest" => Ok(Self::Guest),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Who sits behind a connection. Decided once at connect time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "clientType", rename_all = "camelCase")]
pub enum Identity {
    /// A remote-controlled endpoint reachable through its personal channel.
    #[serde(rename_all = "camelCase")]
    Device {
        /// Stable device id.
        device_id: DeviceId,
    },
    /// An operator connection, not individually addressable.
    Role {
        /// Operator role.
        role: Role,
    },
}

impl Identity {
    /// Device id when this is a device connection.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::Device { device_id } => Some(device_id),
            Self::Role { .. } => None,
        }
    }

    /// Whether this is a device connection.
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { device_id } => write!(f, "device:{device_id}"),
            Self::Role { role } => write!(f, "role:{role}"),
        }
    }
}

/// Derive a connection's identity from its handshake parameters.
///
/// A non-empty `deviceId` yields [`Identity::Device`]. Anything else is a
/// role connection: a recognised `role` is honoured, a missing or unknown
/// one falls back to [`Role::Admin`]. There is no rejection path.
pub fn classify(handshake: &HashMap<String, String>) -> Identity {
    let device_id = handshake
        .get(DEVICE_ID_PARAM)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty());
    if let Some(device_id) = device_id {
        return Identity::Device {
            device_id: DeviceId::from(device_id),
        };
    }

    let role = match handshake.get(ROLE_PARAM).map(|v| v.trim()) {
        None | Some("") => Role::default(),
        Some(raw) => raw.parse().unwrap_or_else(|err| {
            debug!(error = %err, "falling back to default role");
            Role::default()
        }),
    };
    Identity::Role { role }
}
