//! Acknowledgement envelope returned for every client request.
//!
//! ```json
//! {"status": "success", "data": {...}}
//! {"status": "error", "reason": "..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack<T> {
    /// The request was handled.
    Success {
        /// Handler-specific result.
        data: T,
    },
    /// The request was rejected. Nothing was changed.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

impl<T> Ack<T> {
    /// Successful ack carrying `data`.
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    /// Error ack with a reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Whether this is a success ack.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether this is an error ack.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Error reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Error { reason } => Some(reason),
            Self::Success { .. } => None,
        }
    }

    /// Transform the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Ack<U> {
        match self {
            Self::Success { data } => Ack::Success { data: f(data) },
            Self::Error { reason } => Ack::Error { reason },
        }
    }
}

impl<T: Serialize> Ack<T> {
    /// Erase the payload type to JSON.
    pub fn into_json(self) -> Ack<Value> {
        match self {
            Self::Success { data } => match serde_json::to_value(data) {
                Ok(data) => Ack::Success { data },
                Err(e) => Ack::error(format!("failed to encode ack: {e}")),
            },
            Self::Error { reason } => Ack::Error { reason },
        }
    }
}
