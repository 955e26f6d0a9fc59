//! Inbound frame handling: parse, dispatch through the event registry,
//! build the reply.

use relay_core::Ack;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::connection::ClientConnection;
use super::frames::{AckFrame, InboundFrame, error_frame};
use crate::dispatch::EventRegistry;
use crate::relay::RelayContext;

/// Reason sent in place of transport fault details.
const INTERNAL_ERROR: &str = "Internal error";

/// Outcome of one inbound frame.
pub struct HandleResult {
    /// Event name (empty when the frame did not parse).
    pub event: String,
    /// Ack produced by dispatch, if the frame parsed.
    pub ack: Option<Ack<Value>>,
    /// Serialized reply to queue, if any.
    pub reply: Option<String>,
}

/// Handle one inbound text frame from `client`.
#[instrument(skip_all, fields(event))]
pub async fn handle_message(
    message: &str,
    registry: &EventRegistry,
    ctx: &RelayContext,
    client: &ClientConnection,
) -> HandleResult {
    let frame: InboundFrame = match serde_json::from_str(message) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id = %client.id(), "unparseable frame");
            return HandleResult {
                event: String::new(),
                ack: None,
                reply: Some(error_frame(&format!("Invalid frame: {e}")).to_string()),
            };
        }
    };

    let _ = tracing::Span::current().record("event", frame.event.as_str());
    debug!(conn_id = %client.id(), event = %frame.event, ack_id = ?frame.ack_id, "dispatching event");

    let ack = match registry
        .dispatch(&frame.event, frame.data, ctx, client)
        .await
    {
        Ok(ack) => ack,
        Err(e) => {
            error!(conn_id = %client.id(), event = %frame.event, error = %e, "transport fault while handling event");
            Ack::error(INTERNAL_ERROR)
        }
    };

    let reply = frame.ack_id.and_then(|ack_id| {
        serde_json::to_string(&AckFrame { ack_id, ack: &ack })
            .inspect_err(|e| error!(error = %e, "failed to serialize ack"))
            .ok()
    });

    HandleResult {
        event: frame.event,
        ack: Some(ack),
        reply,
    }
}
