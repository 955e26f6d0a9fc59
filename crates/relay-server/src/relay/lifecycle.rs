//! Connect, join and disconnect handling.

use std::collections::{BTreeSet, HashSet};

use relay_core::events::{JoinMissionRoomsAck, MissionPresence, ServerEvent};
use relay_core::{DeviceId, MissionId};
use tracing::{debug, info, warn};

use super::{RelayContext, RelayError};
use crate::transport::RoomMember;
use crate::websocket::connection::ClientConnection;

/// Attach a freshly registered connection to the relay.
///
/// The identity was classified when the connection was built. Devices
/// additionally join their personal channel so commands can reach them.
pub async fn on_connect(ctx: &RelayContext, client: &ClientConnection) -> Result<(), RelayError> {
    if let Some(device_id) = client.identity().device_id() {
        ctx.transport.join(client.id(), &device_id.channel()).await?;
    }
    info!(conn_id = %client.id(), identity = %client.identity(), "client attached");
    Ok(())
}

/// Join `client` to each mission room and report the device rosters.
///
/// Missions are joined one by one with no rollback. Duplicates in the
/// request are collapsed. A device joiner is recorded in the index and
/// announced to each room, itself included.
pub async fn join_missions(
    ctx: &RelayContext,
    client: &ClientConnection,
    missions: Vec<MissionId>,
) -> Result<JoinMissionRoomsAck, RelayError> {
    let guard = match client.identity().device_id() {
        Some(device_id) => Some(ctx.membership.lock_device(device_id).await),
        None => None,
    };

    let mut ack = JoinMissionRoomsAck::default();
    let mut seen = HashSet::new();
    for mission_id in missions {
        if !seen.insert(mission_id.clone()) {
            continue;
        }
        let room = mission_id.room();
        ctx.transport.join(client.id(), &room).await?;

        if let Some(guard) = &guard {
            let _ = ctx.membership.add_membership(guard, mission_id.clone());
        }

        let roster = device_roster(&ctx.transport.members(&room).await?);

        if let Some(guard) = &guard {
            let event = ServerEvent::DeviceJoinedMission(MissionPresence {
                mission_id: mission_id.clone(),
                device_id: guard.device_id().clone(),
            });
            let _ = ctx.transport.broadcast(&room, &event).await?;
        }

        debug!(conn_id = %client.id(), %mission_id, devices = roster.len(), "joined mission room");
        ack.joined.push(mission_id.clone());
        let _ = ack.devices.insert(mission_id, roster);
    }
    Ok(ack)
}

/// Tear down a device's memberships after its socket closed.
///
/// The transport has already detached the connection, so notifications
/// reach only the remaining members. A mission stays recorded while
/// another connection of the same device is still in its room; only the
/// missions the device has actually left are dropped from the index and
/// announced, each once. Every announcement is attempted and the first
/// failure is returned. Returns the announced missions.
pub async fn on_disconnect(
    ctx: &RelayContext,
    client: &ClientConnection,
) -> Result<Vec<MissionId>, RelayError> {
    let Some(device_id) = client.identity().device_id() else {
        return Ok(Vec::new());
    };

    let guard = ctx.membership.lock_device(device_id).await;
    let mut first_error = None;

    // Every live connection of a device sits in its personal channel.
    let siblings = match ctx.transport.members(&device_id.channel()).await {
        Ok(members) => members.len(),
        Err(e) => {
            warn!(%device_id, error = %e, "failed to list device channel");
            let _ = first_error.get_or_insert(e);
            0
        }
    };

    let departed: Vec<MissionId> = if siblings == 0 {
        ctx.membership
            .remove_all_for_device(&guard)
            .into_iter()
            .collect()
    } else {
        let mut departed = Vec::new();
        for mission_id in ctx.membership.missions_for(device_id) {
            let still_present = match ctx.transport.members(&mission_id.room()).await {
                Ok(members) => members
                    .iter()
                    .any(|m| m.identity.device_id() == Some(device_id)),
                Err(e) => {
                    warn!(%device_id, %mission_id, error = %e, "failed to list mission room");
                    let _ = first_error.get_or_insert(e);
                    false
                }
            };
            if !still_present {
                let _ = ctx.membership.remove_membership(&guard, &mission_id);
                departed.push(mission_id);
            }
        }
        departed
    };

    for mission_id in &departed {
        let event = ServerEvent::DeviceLeftMission(MissionPresence {
            mission_id: mission_id.clone(),
            device_id: device_id.clone(),
        });
        if let Err(e) = ctx.transport.broadcast(&mission_id.room(), &event).await {
            warn!(%device_id, %mission_id, error = %e, "failed to announce device departure");
            let _ = first_error.get_or_insert(e);
        }
    }
    drop(guard);

    info!(%device_id, missions = departed.len(), siblings, "device detached");
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(departed),
    }
}

/// Distinct device ids among `members`, sorted.
fn device_roster(members: &[RoomMember]) -> Vec<DeviceId> {
    members
        .iter()
        .filter_map(|m| m.identity.device_id().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
