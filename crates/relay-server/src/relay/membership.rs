//! Reverse index from device to the missions it joined.
//!
//! Mutation requires a [`DeviceGuard`], the per-device async lock held by
//! join and disconnect across their await points. A join and a disconnect
//! for the same device therefore never interleave.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{DeviceId, MissionId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Device → joined missions.
#[derive(Default)]
pub struct MembershipIndex {
    entries: Mutex<HashMap<DeviceId, BTreeSet<MissionId>>>,
    locks: DashMap<DeviceId, Arc<AsyncMutex<()>>>,
}

/// Exclusive hold on one device's index entry.
pub struct DeviceGuard<'a> {
    index: &'a MembershipIndex,
    device_id: DeviceId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DeviceGuard<'_> {
    /// Device this guard covers.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the lock once nobody holds or waits on it.
        let _ = self
            .index
            .locks
            .remove_if(&self.device_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl MembershipIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `device_id`'s entry.
    pub async fn lock_device(&self, device_id: &DeviceId) -> DeviceGuard<'_> {
        let lock = Arc::clone(&self.locks.entry(device_id.clone()).or_default());
        let guard = lock.lock_owned().await;
        DeviceGuard {
            index: self,
            device_id: device_id.clone(),
            guard: Some(guard),
        }
    }

    /// Record that the guarded device joined `mission_id`.
    ///
    /// Returns `false` if it was already recorded.
    pub fn add_membership(&self, guard: &DeviceGuard<'_>, mission_id: MissionId) -> bool {
        self.entries
            .lock()
            .entry(guard.device_id.clone())
            .or_default()
            .insert(mission_id)
    }

    /// Forget one mission of the guarded device, dropping the entry once
    /// it is empty. Returns `false` if the mission was not recorded.
    pub fn remove_membership(&self, guard: &DeviceGuard<'_>, mission_id: &MissionId) -> bool {
        let mut entries = self.entries.lock();
        let Some(missions) = entries.get_mut(&guard.device_id) else {
            return false;
        };
        let removed = missions.remove(mission_id);
        if missions.is_empty() {
            let _ = entries.remove(&guard.device_id);
        }
        removed
    }

    /// Drop the guarded device's entry, returning what it held.
    pub fn remove_all_for_device(&self, guard: &DeviceGuard<'_>) -> BTreeSet<MissionId> {
        self.entries
            .lock()
            .remove(&guard.device_id)
            .unwrap_or_default()
    }

    /// Missions recorded for `device_id`, sorted.
    pub fn missions_for(&self, device_id: &DeviceId) -> Vec<MissionId> {
        self.entries
            .lock()
            .get(device_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of devices with at least one recorded mission.
    pub fn device_count(&self) -> usize {
        self.entries.lock().len()
    }
}
