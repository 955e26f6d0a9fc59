//! Event registry: event name → (schema, handler), built once at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use relay_core::{Ack, Payload, Schema, Validation};
use serde_json::Value;
use tracing::warn;

use crate::metrics::{RELAY_EVENT_DURATION_SECONDS, RELAY_EVENT_ERRORS_TOTAL, RELAY_EVENTS_TOTAL};
use crate::relay::{RelayContext, RelayError};
use crate::transport::TransportError;
use crate::websocket::connection::ClientConnection;

/// Handlers slower than this are logged.
const SLOW_HANDLER: Duration = Duration::from_secs(2);

/// Metric label shared by every event name without a handler.
const UNKNOWN_EVENT_LABEL: &str = "unknown";

/// A handler for one client→server event.
///
/// The payload arrives already validated against [`Payload::schema`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Typed payload of the event.
    type Payload: Payload + Send;

    /// Handle a validated payload on behalf of `client`.
    async fn handle(
        &self,
        payload: Self::Payload,
        ctx: &RelayContext,
        client: &ClientConnection,
    ) -> Result<Value, RelayError>;
}

/// Type-erased table entry.
#[async_trait]
trait Route: Send + Sync {
    async fn call(
        &self,
        raw: Value,
        ctx: &RelayContext,
        client: &ClientConnection,
    ) -> Result<Value, RelayError>;
}

struct Validated<H> {
    schema: Schema,
    handler: H,
}

#[async_trait]
impl<H: EventHandler> Route for Validated<H> {
    async fn call(
        &self,
        raw: Value,
        ctx: &RelayContext,
        client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        match self.schema.validate::<H::Payload>(&raw) {
            Validation::Valid(payload) => self.handler.handle(payload, ctx, client).await,
            Validation::Invalid(reason) => Err(RelayError::InvalidPayload(reason)),
        }
    }
}

/// Registry mapping event names to validated handlers.
#[derive(Default)]
pub struct EventRegistry {
    routes: HashMap<String, Arc<dyn Route>>,
}

impl EventRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, paired with its payload schema.
    pub fn register<H: EventHandler + 'static>(&mut self, event: &str, handler: H) {
        let route = Validated {
            schema: <H::Payload as Payload>::schema(),
            handler,
        };
        let _ = self.routes.insert(event.to_owned(), Arc::new(route));
    }

    /// Validate and handle one inbound event.
    ///
    /// Validation and lookup failures become error acks with no side
    /// effects. Transport faults are returned to the caller.
    pub async fn dispatch(
        &self,
        event: &str,
        payload: Value,
        ctx: &RelayContext,
        client: &ClientConnection,
    ) -> Result<Ack<Value>, TransportError> {
        let label = self.metric_label(event).to_owned();
        counter!(RELAY_EVENTS_TOTAL, "event" => label.clone()).increment(1);

        let Some(route) = self.routes.get(event) else {
            counter!(RELAY_EVENT_ERRORS_TOTAL, "event" => label, "error_type" => "unknown_event")
                .increment(1);
            return Ok(Ack::error(format!("Unknown event '{event}'")));
        };

        let start = Instant::now();
        let result = route.call(payload, ctx, client).await;
        let duration = start.elapsed();
        histogram!(RELAY_EVENT_DURATION_SECONDS, "event" => label.clone())
            .record(duration.as_secs_f64());
        if duration >= SLOW_HANDLER {
            warn!(event, duration_secs = duration.as_secs_f64(), "slow event handler");
        }

        match result {
            Ok(data) => Ok(Ack::success(data)),
            Err(err) => {
                counter!(RELAY_EVENT_ERRORS_TOTAL, "event" => label, "error_type" => err.kind())
                    .increment(1);
                match err {
                    RelayError::Transport(e) => Err(e),
                    recoverable => Ok(Ack::error(recoverable.to_string())),
                }
            }
        }
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `event` has a handler.
    pub fn has_event(&self, event: &str) -> bool {
        self.routes.contains_key(event)
    }

    /// Label for per-event metrics. Client-chosen names never become
    /// labels unless a handler is registered under them.
    fn metric_label<'a>(&self, event: &'a str) -> &'a str {
        if self.has_event(event) {
            event
        } else {
            UNKNOWN_EVENT_LABEL
        }
    }
}
