//! `RelayServer`: Axum router, WebSocket upgrade and listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{ConnectionId, classify};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{EventRegistry, register_all};
use crate::health::{self, HealthResponse};
use crate::relay::RelayContext;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::RoomRegistry;
use crate::websocket::session::run_ws_session;

/// State shared by every Axum handler and session.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections and rooms.
    pub rooms: Arc<RoomRegistry>,
    /// Relay context over `rooms`.
    pub relay: Arc<RelayContext>,
    /// Event dispatch table.
    pub registry: Arc<EventRegistry>,
    /// Shutdown signal.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// One permit per admitted session, held until the session ends.
    connection_slots: Arc<Semaphore>,
}

impl AppState {
    /// Claim a session slot, or `None` when `max_connections` are live.
    pub fn reserve_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.connection_slots.clone().try_acquire_owned().ok()
    }
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

/// A running listener.
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    /// Serve task; finishes after shutdown.
    pub task: JoinHandle<()>,
}

impl RelayServer {
    /// Build a server with every relay event registered.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let rooms = Arc::new(RoomRegistry::new());
        let relay = Arc::new(RelayContext::new(rooms.clone()));
        let mut registry = EventRegistry::new();
        register_all(&mut registry);
        let slots = config.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            state: AppState {
                connection_slots: Arc::new(Semaphore::new(slots)),
                config: Arc::new(config),
                rooms,
                relay,
                registry: Arc::new(registry),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Axum router: the WebSocket endpoint, `/health` and `/metrics`.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background until shutdown.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let config = &self.state.config;
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, path = %config.path, "mission relay listening");
        Ok(ServerHandle { addr, task })
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Room registry.
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.state.rooms
    }

    /// Relay context.
    pub fn relay(&self) -> &Arc<RelayContext> {
        &self.state.relay
    }

    /// Configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Event registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.state.registry
    }
}

/// GET <path>: classify the handshake and upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = state.reserve_slot() else {
        warn!(limit = state.config.max_connections, "refusing connection");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let identity = classify(&handshake);
    let conn_id = ConnectionId::new();
    // A failed upgrade drops the closure and with it the slot.
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, conn_id, identity, state).await;
            drop(slot);
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.rooms.connection_count().await,
        state.rooms.room_count().await,
        state.relay.membership.device_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), None)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn registers_every_event() {
        let server = make_server();
        assert_eq!(server.registry().events().len(), 5);
        assert_eq!(server.config().path, "/socket");
    }

    #[test]
    fn connection_slots_are_reserved_until_released() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let server = RelayServer::new(config, None);
        let first = server.state.reserve_slot();
        assert!(first.is_some());
        assert!(server.state.reserve_slot().is_none());
        drop(first);
        assert!(server.state.reserve_slot().is_some());
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
    }

    #[tokio::test]
    async fn metrics_empty_without_recorder() {
        let resp = make_server()
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn socket_requires_upgrade() {
        let resp = make_server()
            .router()
            .oneshot(Request::get("/socket").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let resp = make_server()
            .router()
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.task)
            .await
            .unwrap()
            .unwrap();
    }
}
