//! JSON frames exchanged over the socket.
//!
//! ```text
//! client → server   {"event": "device-command", "data": {...}, "ackId": 7}
//! server → client   {"ackId": 7, "ack": {"status": "success", "data": {...}}}
//! server → client   {"event": "device-joined-mission", "data": {...}}
//! server → client   {"event": "error", "data": {"reason": "..."}}
//! ```

use relay_core::Ack;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client request. Without `ackId` the request is fire-and-forget.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// Event name.
    pub event: String,
    /// Untyped payload, validated by the event's schema.
    #[serde(default)]
    pub data: Value,
    /// Correlation id echoed in the ack.
    #[serde(default)]
    pub ack_id: Option<u64>,
}

/// Reply to a request that carried an `ackId`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckFrame<'a> {
    /// Correlation id from the request.
    pub ack_id: u64,
    /// Outcome.
    pub ack: &'a Ack<Value>,
}

/// Frame sent when an inbound frame cannot be parsed at all.
pub fn error_frame(reason: &str) -> Value {
    serde_json::json!({
        "event": "error",
        "data": { "reason": reason },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_frame() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"event":"ping","data":"hi","ackId":3}"#).unwrap();
        assert_eq!(frame.event, "ping");
        assert_eq!(frame.data, json!("hi"));
        assert_eq!(frame.ack_id, Some(3));
    }

    #[test]
    fn data_and_ack_id_are_optional() {
        let frame: InboundFrame = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(frame.data, Value::Null);
        assert_eq!(frame.ack_id, None);
    }

    #[test]
    fn event_is_required() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"data":1}"#).is_err());
    }

    #[test]
    fn ack_frame_shape() {
        let ack = Ack::success(json!({"pong": "x"}));
        let frame = AckFrame { ack_id: 9, ack: &ack };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"ackId": 9, "ack": {"status": "success", "data": {"pong": "x"}}})
        );
    }

    #[test]
    fn error_frame_shape() {
        assert_eq!(error_frame("bad")["data"]["reason"], "bad");
        assert_eq!(error_frame("bad")["event"], "error");
    }
}
