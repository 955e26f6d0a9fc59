//! Handlers for every client→server event.

use async_trait::async_trait;
use relay_core::events::{
    DeviceCommand, DeviceStatusUpdate, JoinMissionRooms, Ping, Pong, SendMissionCommand, names,
};
use serde::Serialize;
use serde_json::Value;

use super::registry::{EventHandler, EventRegistry};
use crate::relay::{RelayContext, RelayError, lifecycle, router};
use crate::transport::TransportError;
use crate::websocket::connection::ClientConnection;

fn to_value(data: impl Serialize) -> Result<Value, RelayError> {
    serde_json::to_value(data).map_err(|e| RelayError::Transport(TransportError::Serialization(e)))
}

/// `join-mission-rooms`.
pub struct JoinMissionRoomsHandler;

#[async_trait]
impl EventHandler for JoinMissionRoomsHandler {
    type Payload = JoinMissionRooms;

    async fn handle(
        &self,
        payload: JoinMissionRooms,
        ctx: &RelayContext,
        client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        to_value(lifecycle::join_missions(ctx, client, payload.missions).await?)
    }
}

/// `device-command`.
pub struct DeviceCommandHandler;

#[async_trait]
impl EventHandler for DeviceCommandHandler {
    type Payload = DeviceCommand;

    async fn handle(
        &self,
        payload: DeviceCommand,
        ctx: &RelayContext,
        _client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        to_value(router::send_device_command(ctx, payload).await?)
    }
}

/// `device-status-update`.
pub struct DeviceStatusUpdateHandler;

#[async_trait]
impl EventHandler for DeviceStatusUpdateHandler {
    type Payload = DeviceStatusUpdate;

    async fn handle(
        &self,
        payload: DeviceStatusUpdate,
        ctx: &RelayContext,
        _client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        to_value(router::update_device_status(ctx, payload).await?)
    }
}

/// `send-mission-command`.
pub struct SendMissionCommandHandler;

#[async_trait]
impl EventHandler for SendMissionCommandHandler {
    type Payload = SendMissionCommand;

    async fn handle(
        &self,
        payload: SendMissionCommand,
        ctx: &RelayContext,
        _client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        to_value(router::send_mission_command(ctx, payload).await?)
    }
}

/// `ping`: echo the payload back.
pub struct PingHandler;

#[async_trait]
impl EventHandler for PingHandler {
    type Payload = Ping;

    async fn handle(
        &self,
        payload: Ping,
        _ctx: &RelayContext,
        _client: &ClientConnection,
    ) -> Result<Value, RelayError> {
        to_value(Pong { pong: payload.0 })
    }
}

/// Register every client→server event.
pub fn register_all(registry: &mut EventRegistry) {
    registry.register(names::JOIN_MISSION_ROOMS, JoinMissionRoomsHandler);
    registry.register(names::DEVICE_COMMAND, DeviceCommandHandler);
    registry.register(names::DEVICE_STATUS_UPDATE, DeviceStatusUpdateHandler);
    registry.register(names::SEND_MISSION_COMMAND, SendMissionCommandHandler);
    registry.register(names::PING, PingHandler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RoomRegistry;
    use crate::websocket::connection::test_support::{controller, device, drain};
    use relay_core::Ack;
    use serde_json::json;
    use std::sync::Arc;

    struct Harness {
        rooms: Arc<RoomRegistry>,
        ctx: RelayContext,
        registry: EventRegistry,
    }

    fn harness() -> Harness {
        let rooms = Arc::new(RoomRegistry::new());
        let ctx = RelayContext::new(rooms.clone());
        let mut registry = EventRegistry::new();
        register_all(&mut registry);
        Harness {
            rooms,
            ctx,
            registry,
        }
    }

    impl Harness {
        async fn send(&self, client: &ClientConnection, event: &str, data: Value) -> Ack<Value> {
            self.registry
                .dispatch(event, data, &self.ctx, client)
                .await
                .unwrap()
        }
    }

    #[test]
    fn registers_catalogue() {
        let h = harness();
        assert_eq!(
            h.registry.events(),
            vec![
                "device-command",
                "device-status-update",
                "join-mission-rooms",
                "ping",
                "send-mission-command",
            ]
        );
    }

    #[tokio::test]
    async fn ping_pongs() {
        let h = harness();
        let (client, _rx) = controller("c");
        let ack = h.send(&client, "ping", json!("hello")).await;
        assert_eq!(ack, Ack::success(json!({"pong": "hello"})));
        let ack = h.send(&client, "ping", json!("")).await;
        assert!(ack.is_error());
    }

    #[tokio::test]
    async fn join_ack_shape() {
        let h = harness();
        let (dev, _rx) = device("c", "d1");
        h.rooms.add(dev.clone()).await;
        let ack = h
            .send(&dev, "join-mission-rooms", json!({"missions": ["m1", "m1"]}))
            .await;
        assert_eq!(
            ack,
            Ack::success(json!({"joined": ["m1"], "devices": {"m1": ["d1"]}}))
        );
    }

    #[tokio::test]
    async fn malformed_payloads_have_no_side_effects() {
        let h = harness();
        let (dev, mut dev_rx) = device("dev", "d1");
        let (ctl, mut ctl_rx) = controller("ctl");
        h.rooms.add(dev.clone()).await;
        h.rooms.add(ctl.clone()).await;
        let _ = h.send(&ctl, "join-mission-rooms", json!({"missions": ["m1"]})).await;
        let _ = drain(&mut ctl_rx);

        let malformed = [
            ("join-mission-rooms", json!({"missions": []})),
            ("join-mission-rooms", json!({"missions": "m1"})),
            ("device-command", json!({"missionId": "m1", "deviceId": "", "command": "x"})),
            ("device-status-update", json!({"missionId": "m1", "deviceId": "d1", "status": "ok", "timestamp": -1})),
            ("send-mission-command", json!({"missionId": "m1"})),
            ("send-mission-command", json!(["m1"])),
        ];
        for _ in 0..2 {
            for (event, data) in &malformed {
                let ack = h.send(&dev, event, data.clone()).await;
                assert!(ack.is_error(), "{event}: {data}");
            }
        }

        assert!(h.rooms.rooms_of(dev.id()).await.is_empty());
        assert_eq!(h.ctx.membership.device_count(), 0);
        assert!(drain(&mut ctl_rx).is_empty());
        assert!(drain(&mut dev_rx).is_empty());
    }

    #[tokio::test]
    async fn validation_reason_lists_every_field() {
        let h = harness();
        let (ctl, _rx) = controller("ctl");
        let ack = h.send(&ctl, "device-command", json!({"from": 7})).await;
        assert_eq!(
            ack.reason(),
            Some(
                "missionId: Required; deviceId: Required; command: Required; \
                 from: expected string, received number"
            )
        );
    }

    #[tokio::test]
    async fn device_command_not_found_reason() {
        let h = harness();
        let (ctl, _rx) = controller("ctl");
        let ack = h
            .send(
                &ctl,
                "device-command",
                json!({"missionId": "m1", "deviceId": "d1", "command": "arm"}),
            )
            .await;
        assert_eq!(ack.reason(), Some("Device d1 not found in mission m1"));
    }

    #[tokio::test]
    async fn status_and_mission_command_acks() {
        let h = harness();
        let (ctl, _rx) = controller("ctl");
        let ack = h
            .send(
                &ctl,
                "device-status-update",
                json!({"missionId": "m1", "deviceId": "d1", "status": "ok", "timestamp": 5}),
            )
            .await;
        assert_eq!(ack, Ack::success(json!({"received": true})));

        let ack = h
            .send(&ctl, "send-mission-command", json!({"missionId": "m1", "command": "go"}))
            .await;
        assert_eq!(ack, Ack::success(json!({"deliveredTo": "room:m1"})));
    }
}
