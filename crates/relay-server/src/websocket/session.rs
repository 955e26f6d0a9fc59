//! Session loop for one WebSocket client, from upgrade to disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::events::{ConnectedInfo, ServerEvent};
use relay_core::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::handle_message;
use crate::metrics::{
    RELAY_CONNECTION_DURATION_SECONDS, RELAY_CONNECTIONS_ACTIVE, RELAY_CONNECTIONS_TOTAL,
    RELAY_DISCONNECTIONS_TOTAL,
};
use crate::relay::lifecycle;
use crate::server::AppState;
use crate::transport::RoomTransport;

/// How long the writer may take to flush and close after the reader stops.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run one client session.
///
/// 1. Registers the connection and attaches it to the relay
/// 2. Sends the `connected` greeting
/// 3. Handles inbound frames strictly in order
/// 4. Pings periodically and drops clients that stop answering
/// 5. Detaches from all rooms and announces device departures
#[instrument(skip_all, fields(conn_id = %conn_id, identity = %identity))]
pub async fn run_ws_session(ws: WebSocket, conn_id: ConnectionId, identity: Identity, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), identity, send_tx));

    let started = Instant::now();
    counter!(RELAY_CONNECTIONS_TOTAL).increment(1);
    gauge!(RELAY_CONNECTIONS_ACTIVE).increment(1.0);
    info!("client connected");

    state.rooms.add(connection.clone()).await;

    // Cancelled by server shutdown, by the writer on heartbeat timeout,
    // or by the reader when the client goes away.
    let session_done = state.shutdown.child_token();

    let writer = {
        let conn = connection.clone();
        let done = session_done.clone();
        let interval = state.config.heartbeat_interval();
        let timeout = state.config.heartbeat_timeout();
        tokio::spawn(async move {
            let mut ping = tokio::time::interval(interval);
            let _ = ping.tick().await;
            loop {
                tokio::select! {
                    frame = send_rx.recv() => {
                        let Some(text) = frame else { break };
                        if ws_tx.send(Message::Text(Arc::unwrap_or_clone(text).into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if !conn.check_alive() && conn.last_pong_elapsed() > timeout {
                            warn!(?timeout, "client unresponsive, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    () = done.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            done.cancel();
        }.instrument(tracing::Span::current()))
    };

    let attached = match lifecycle::on_connect(&state.relay, &connection).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "failed to attach client");
            false
        }
    };

    if attached {
        let greeting = ServerEvent::Connected(ConnectedInfo {
            connection_id: conn_id.clone(),
            identity: connection.identity().clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = state.rooms.send_to(&conn_id, &greeting).await {
            warn!(error = %e, "failed to queue greeting");
        }

        loop {
            let msg = tokio::select! {
                msg = ws_rx.next() => msg,
                () = session_done.cancelled() => break,
            };
            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    debug!(error = %e, "socket read failed");
                    break;
                }
                None => break,
            };

            let text = match msg {
                Message::Text(ref t) => t.as_str().to_owned(),
                Message::Binary(ref data) => match std::str::from_utf8(data) {
                    Ok(s) => s.to_owned(),
                    Err(_) => {
                        debug!(len = data.len(), "ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => {
                    info!("client sent close frame");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    connection.mark_alive();
                    continue;
                }
            };

            let result = handle_message(&text, &state.registry, &state.relay, &connection).await;
            if let Some(reply) = result.reply {
                if !connection.send(Arc::new(reply)) {
                    warn!(event = %result.event, "failed to queue reply");
                }
            }
        }
    }

    // Detach from every room first so departures reach only the others.
    session_done.cancel();
    let _ = state.rooms.remove(&conn_id).await;
    match lifecycle::on_disconnect(&state.relay, &connection).await {
        Ok(missions) if !missions.is_empty() => {
            debug!(missions = missions.len(), "announced device departure");
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "failed to announce device departure"),
    }

    let mut writer = writer;
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }

    counter!(RELAY_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(RELAY_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(RELAY_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(
        age_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}
