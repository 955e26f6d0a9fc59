//! Command routing: unicast to a device's personal channel or broadcast
//! to a mission room.

use relay_core::events::{
    DeliveredTo, DeviceCommand, DeviceCommandEvent, DeviceStatusUpdate, MissionCommandEvent,
    SendMissionCommand, ServerEvent, StatusReceived,
};
use tracing::debug;

use super::{RelayContext, RelayError};

/// Deliver a command to one device, provided it is in the stated mission.
///
/// Membership is checked against the live room, not the reverse index.
pub async fn send_device_command(
    ctx: &RelayContext,
    cmd: DeviceCommand,
) -> Result<DeliveredTo, RelayError> {
    let room = cmd.mission_id.room();
    let present = ctx
        .transport
        .members(&room)
        .await?
        .iter()
        .any(|m| m.identity.device_id() == Some(&cmd.device_id));
    if !present {
        return Err(RelayError::DeviceNotInMission {
            device_id: cmd.device_id,
            mission_id: cmd.mission_id,
        });
    }

    let ack = DeliveredTo::device(&cmd.device_id);
    let event = DeviceCommandEvent::from(cmd);
    let recipients = ctx
        .transport
        .broadcast(&event.device_id.channel(), &ServerEvent::DeviceCommand(event.clone()))
        .await?;
    debug!(device_id = %event.device_id, mission_id = %event.mission_id, recipients, "device command delivered");
    Ok(ack)
}

/// Relay a device status report to its mission room unchanged.
pub async fn update_device_status(
    ctx: &RelayContext,
    update: DeviceStatusUpdate,
) -> Result<StatusReceived, RelayError> {
    let room = update.mission_id.room();
    let _ = ctx
        .transport
        .broadcast(&room, &ServerEvent::DeviceStatusUpdate(update))
        .await?;
    Ok(StatusReceived { received: true })
}

/// Broadcast a command to every member of a mission room, sender included.
pub async fn send_mission_command(
    ctx: &RelayContext,
    cmd: SendMissionCommand,
) -> Result<DeliveredTo, RelayError> {
    let ack = DeliveredTo::room(&cmd.mission_id);
    let room = cmd.mission_id.room();
    let recipients = ctx
        .transport
        .broadcast(&room, &ServerEvent::MissionCommand(MissionCommandEvent::from(cmd)))
        .await?;
    debug!(%room, recipients, "mission command broadcast");
    Ok(ack)
}
