//! In-process room registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use relay_core::{ConnectionId, Room};
use relay_core::events::ServerEvent;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{RoomMember, RoomTransport, TransportError};
use crate::metrics::RELAY_BROADCAST_DROPS_TOTAL;
use crate::websocket::connection::ClientConnection;

#[derive(Default)]
struct RoomState {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    rooms: HashMap<Room, HashSet<ConnectionId>>,
    /// Reverse of `rooms`, so removal touches only the rooms a connection is in.
    joined: HashMap<ConnectionId, HashSet<Room>>,
}

/// Tracks live connections and which rooms each belongs to.
///
/// Rooms are created on first join and deleted when their last member
/// leaves, so a room exists exactly while it has members.
#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RoomState>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut state = self.state.write().await;
        let _ = state
            .connections
            .insert(connection.id().clone(), connection);
    }

    /// Unregister a connection and take it out of every room.
    pub async fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut state = self.state.write().await;
        let removed = state.connections.remove(connection_id);
        if let Some(rooms) = state.joined.remove(connection_id) {
            for room in rooms {
                let empty = state.rooms.get_mut(&room).is_some_and(|members| {
                    let _ = members.remove(connection_id);
                    members.is_empty()
                });
                if empty {
                    let _ = state.rooms.remove(&room);
                }
            }
        }
        removed
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Rooms a connection is in, sorted.
    pub async fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<Room> {
        let state = self.state.read().await;
        let mut rooms: Vec<Room> = state
            .joined
            .get(connection_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

fn deliver(conn: &ClientConnection, frame: &Arc<String>, event: &ServerEvent) -> bool {
    if conn.send(frame.clone()) {
        return true;
    }
    counter!(RELAY_BROADCAST_DROPS_TOTAL).increment(1);
    warn!(
        conn_id = %conn.id(),
        event = event.name(),
        drops = conn.drop_count(),
        "dropped event for client"
    );
    false
}

#[async_trait]
impl RoomTransport for RoomRegistry {
    async fn join(&self, connection: &ConnectionId, room: &Room) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(connection) {
            return Err(TransportError::UnknownConnection(connection.clone()));
        }
        let _ = state
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection.clone());
        let _ = state
            .joined
            .entry(connection.clone())
            .or_default()
            .insert(room.clone());
        Ok(())
    }

    async fn broadcast(&self, room: &Room, event: &ServerEvent) -> Result<usize, TransportError> {
        let frame = Arc::new(serde_json::to_string(event)?);
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            debug!(%room, event = event.name(), "broadcast to empty room");
            return Ok(0);
        };
        let delivered = members
            .iter()
            .filter_map(|id| state.connections.get(id))
            .filter(|conn| deliver(conn, &frame, event))
            .count();
        debug!(
            %room,
            event = event.name(),
            recipients = members.len(),
            delivered,
            "broadcast event to room"
        );
        Ok(delivered)
    }

    async fn send_to(
        &self,
        connection: &ConnectionId,
        event: &ServerEvent,
    ) -> Result<bool, TransportError> {
        let frame = Arc::new(serde_json::to_string(event)?);
        let state = self.state.read().await;
        let conn = state
            .connections
            .get(connection)
            .ok_or_else(|| TransportError::UnknownConnection(connection.clone()))?;
        Ok(deliver(conn, &frame, event))
    }

    async fn members(&self, room: &Room) -> Result<Vec<RoomMember>, TransportError> {
        let state = self.state.read().await;
        let members = state
            .rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| state.connections.get(id))
            .map(|conn| RoomMember {
                connection_id: conn.id().clone(),
                identity: conn.identity().clone(),
            })
            .collect();
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::test_support::{controller, device, drain};
    use assert_matches::assert_matches;
    use relay_core::events::MissionPresence;
    use relay_core::{DeviceId, MissionId};

    fn mission(id: &str) -> Room {
        MissionId::from(id).room()
    }

    fn channel(id: &str) -> Room {
        DeviceId::from(id).channel()
    }

    fn presence() -> ServerEvent {
        ServerEvent::DeviceJoinedMission(MissionPresence {
            mission_id: "m1".into(),
            device_id: "d1".into(),
        })
    }

    #[tokio::test]
    async fn add_and_remove() {
        let rooms = RoomRegistry::new();
        let (conn, _rx) = controller("c1");
        rooms.add(conn).await;
        assert_eq!(rooms.connection_count().await, 1);
        assert!(rooms.remove(&"c1".into()).await.is_some());
        assert_eq!(rooms.connection_count().await, 0);
    }

    #[tokio::test]
    async fn remove_unknown_is_none() {
        let rooms = RoomRegistry::new();
        assert!(rooms.remove(&"ghost".into()).await.is_none());
    }

    #[tokio::test]
    async fn join_unknown_connection_fails() {
        let rooms = RoomRegistry::new();
        let err = rooms.join(&"ghost".into(), &mission("m1")).await.unwrap_err();
        assert_matches!(err, TransportError::UnknownConnection(id) if id.as_str() == "ghost");
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let rooms = RoomRegistry::new();
        let (conn, _rx) = device("c1", "d1");
        rooms.add(conn).await;
        rooms.join(&"c1".into(), &mission("m1")).await.unwrap();
        rooms.join(&"c1".into(), &mission("m1")).await.unwrap();
        assert_eq!(rooms.members(&mission("m1")).await.unwrap().len(), 1);
        assert_eq!(rooms.rooms_of(&"c1".into()).await, vec![mission("m1")]);
    }

    #[tokio::test]
    async fn broadcast_reaches_only_room_members() {
        let rooms = RoomRegistry::new();
        let (a, mut rx_a) = controller("a");
        let (b, mut rx_b) = device("b", "d1");
        let (c, mut rx_c) = controller("c");
        rooms.add(a).await;
        rooms.add(b).await;
        rooms.add(c).await;
        rooms.join(&"a".into(), &mission("m1")).await.unwrap();
        rooms.join(&"b".into(), &mission("m1")).await.unwrap();

        let delivered = rooms.broadcast(&mission("m1"), &presence()).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        let got = drain(&mut rx_b);
        assert_eq!(got[0]["event"], "device-joined-mission");
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn broadcast_to_empty_room() {
        let rooms = RoomRegistry::new();
        assert_eq!(rooms.broadcast(&mission("nobody"), &presence()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_dropped_clients() {
        let rooms = RoomRegistry::new();
        let (a, rx_a) = controller("a");
        let (b, mut rx_b) = controller("b");
        rooms.add(a.clone()).await;
        rooms.add(b).await;
        rooms.join(&"a".into(), &mission("r")).await.unwrap();
        rooms.join(&"b".into(), &mission("r")).await.unwrap();
        drop(rx_a);

        assert_eq!(rooms.broadcast(&mission("r"), &presence()).await.unwrap(), 1);
        assert_eq!(a.drop_count(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn send_to_single_connection() {
        let rooms = RoomRegistry::new();
        let (a, mut rx_a) = controller("a");
        rooms.add(a).await;
        assert!(rooms.send_to(&"a".into(), &presence()).await.unwrap());
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(rooms.send_to(&"zz".into(), &presence()).await.is_err());
    }

    #[tokio::test]
    async fn members_report_identity() {
        let rooms = RoomRegistry::new();
        let (a, _rx_a) = device("a", "d1");
        rooms.add(a.clone()).await;
        rooms.join(&"a".into(), &mission("m1")).await.unwrap();
        let members = rooms.members(&mission("m1")).await.unwrap();
        assert_eq!(
            members,
            vec![RoomMember {
                connection_id: "a".into(),
                identity: a.identity().clone(),
            }]
        );
        assert!(rooms.members(&mission("none")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_leaves_all_rooms_and_prunes_empty_ones() {
        let rooms = RoomRegistry::new();
        let (a, _rx_a) = device("a", "d1");
        let (b, _rx_b) = controller("b");
        rooms.add(a).await;
        rooms.add(b).await;
        for room in [channel("d1"), mission("m1"), mission("m2")] {
            rooms.join(&"a".into(), &room).await.unwrap();
        }
        rooms.join(&"b".into(), &mission("m1")).await.unwrap();
        assert_eq!(rooms.room_count().await, 3);

        let _ = rooms.remove(&"a".into()).await;
        assert_eq!(rooms.room_count().await, 1);
        assert_eq!(rooms.members(&mission("m1")).await.unwrap().len(), 1);
        assert!(rooms.rooms_of(&"a".into()).await.is_empty());
    }

    #[tokio::test]
    async fn personal_channel_never_aliases_a_mission_room() {
        let rooms = RoomRegistry::new();
        let (dev, mut dev_rx) = device("dev", "mission:m1");
        let (ctl, mut ctl_rx) = controller("ctl");
        rooms.add(dev).await;
        rooms.add(ctl).await;
        rooms.join(&"dev".into(), &channel("mission:m1")).await.unwrap();
        rooms.join(&"ctl".into(), &mission("m1")).await.unwrap();

        let members = rooms.members(&mission("m1")).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].connection_id.as_str(), "ctl");

        let delivered = rooms.broadcast(&channel("mission:m1"), &presence()).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut dev_rx).len(), 1);
        assert!(drain(&mut ctl_rx).is_empty());
    }
}
