//! Working view-state shared by the fetch path and animation runs.
//!
//! Two writers touch the store: `replace` (authoritative snapshots) and
//! `set_driver_location` (animation steps). While a run holds override
//! authority for a driver, only that run moves the driver's location; every
//! other field keeps following the latest snapshot.

use std::collections::{BTreeSet, HashMap};

use shared::{
    domain::{DriverId, NodeId},
    protocol::{Driver, Snapshot},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{animation::RunId, error::ClientError};

struct DriverOverride {
    run_id: RunId,
    location: NodeId,
}

#[derive(Default)]
struct StoreInner {
    base: Snapshot,
    overrides: HashMap<DriverId, DriverOverride>,
    /// Runs whose override was dropped because its location left the map.
    stranded: HashMap<RunId, NodeId>,
    issued_fetch_seq: u64,
    applied_fetch_seq: u64,
}

impl StoreInner {
    fn install(&mut self, snapshot: Snapshot) {
        let stranded = &mut self.stranded;
        self.overrides.retain(|driver_id, held| {
            if !snapshot.drivers.contains_key(driver_id) {
                info!(
                    driver = %driver_id,
                    run = %held.run_id,
                    "store: dropping override, driver left the snapshot"
                );
                return false;
            }
            if !snapshot.has_node(&held.location) {
                info!(
                    driver = %driver_id,
                    run = %held.run_id,
                    node = %held.location,
                    "store: dropping override, location left the snapshot"
                );
                stranded.insert(held.run_id, held.location.clone());
                return false;
            }
            true
        });
        self.base = snapshot;
    }

    fn merged(&self) -> MergedView {
        let mut snapshot = self.base.clone();
        let mut animated = BTreeSet::new();
        for (driver_id, held) in &self.overrides {
            if let Some(driver) = snapshot.drivers.get_mut(driver_id) {
                driver.location = held.location.clone();
                animated.insert(driver_id.clone());
            }
        }
        MergedView { snapshot, animated }
    }
}

/// Base snapshot with active animation overrides applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedView {
    pub snapshot: Snapshot,
    /// Drivers whose location currently comes from an animation run.
    pub animated: BTreeSet<DriverId>,
}

impl MergedView {
    pub fn driver(&self, driver_id: &DriverId) -> Option<&Driver> {
        self.snapshot.drivers.get(driver_id)
    }

    pub fn driver_location(&self, driver_id: &DriverId) -> Option<&NodeId> {
        self.driver(driver_id).map(|driver| &driver.location)
    }

    pub fn is_animated(&self, driver_id: &DriverId) -> bool {
        self.animated.contains(driver_id)
    }
}

#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                base: snapshot,
                ..StoreInner::default()
            }),
        }
    }

    /// Installs `snapshot` as the new base. Drivers under an active override
    /// keep their animated location; all other fields come from `snapshot`.
    pub async fn replace(&self, snapshot: Snapshot) {
        let mut guard = self.inner.lock().await;
        guard.install(snapshot);
    }

    /// Reserves the sequence number for a fetch about to be issued.
    pub async fn next_fetch_seq(&self) -> u64 {
        let mut guard = self.inner.lock().await;
        guard.issued_fetch_seq += 1;
        guard.issued_fetch_seq
    }

    /// Like [`StateStore::replace`], but ignores a response that was issued
    /// before the one currently installed. Returns whether it was installed.
    pub async fn replace_fetched(&self, seq: u64, snapshot: Snapshot) -> bool {
        let mut guard = self.inner.lock().await;
        if seq <= guard.applied_fetch_seq {
            debug!(
                seq,
                applied = guard.applied_fetch_seq,
                "store: discarding stale snapshot"
            );
            return false;
        }
        guard.applied_fetch_seq = seq;
        guard.install(snapshot);
        true
    }

    /// Grants `run_id` override authority over `driver_id`, displacing any
    /// previous holder. The override starts at the driver's merged location.
    pub async fn acquire_override(
        &self,
        driver_id: &DriverId,
        run_id: RunId,
    ) -> Result<Option<RunId>, ClientError> {
        let mut guard = self.inner.lock().await;
        let Some(driver) = guard.base.drivers.get(driver_id) else {
            return Err(ClientError::UnknownDriver(driver_id.clone()));
        };
        let base_location = driver.location.clone();

        let previous = guard.overrides.remove(driver_id);
        let location = previous
            .as_ref()
            .map(|held| held.location.clone())
            .unwrap_or(base_location);
        guard
            .overrides
            .insert(driver_id.clone(), DriverOverride { run_id, location });

        Ok(previous.map(|held| held.run_id))
    }

    /// Moves `driver_id` to `node_id` on behalf of `run_id`.
    pub async fn set_driver_location(
        &self,
        run_id: RunId,
        driver_id: &DriverId,
        node_id: &NodeId,
    ) -> Result<(), ClientError> {
        let mut guard = self.inner.lock().await;
        if !guard.base.drivers.contains_key(driver_id) {
            return Err(ClientError::UnknownDriver(driver_id.clone()));
        }
        if !guard.base.has_node(node_id) {
            return Err(ClientError::UnknownNode(node_id.clone()));
        }
        let inner = &mut *guard;
        match inner.overrides.get_mut(driver_id) {
            Some(held) if held.run_id == run_id => {
                held.location = node_id.clone();
                Ok(())
            }
            // Dropped by `replace` after its node left the map.
            None if inner.stranded.contains_key(&run_id) => Err(ClientError::UnknownNode(
                inner.stranded[&run_id].clone(),
            )),
            _ => Err(ClientError::Superseded {
                run_id,
                driver_id: driver_id.clone(),
            }),
        }
    }

    /// Drops the override held by `run_id`, keeping its last location in the
    /// base until the next snapshot arrives. No-op if `run_id` lost authority.
    pub async fn release_override(&self, driver_id: &DriverId, run_id: RunId) -> bool {
        let mut guard = self.inner.lock().await;
        guard.stranded.remove(&run_id);
        let holds = guard
            .overrides
            .get(driver_id)
            .is_some_and(|held| held.run_id == run_id);
        if !holds {
            return false;
        }

        let Some(held) = guard.overrides.remove(driver_id) else {
            return false;
        };
        let known_node = guard.base.has_node(&held.location);
        if let Some(driver) = guard.base.drivers.get_mut(driver_id) {
            if known_node {
                driver.location = held.location;
            }
        }
        true
    }

    pub async fn override_holder(&self, driver_id: &DriverId) -> Option<RunId> {
        let guard = self.inner.lock().await;
        guard.overrides.get(driver_id).map(|held| held.run_id)
    }

    pub async fn current_view(&self) -> MergedView {
        let guard = self.inner.lock().await;
        guard.merged()
    }

    pub async fn base_snapshot(&self) -> Snapshot {
        let guard = self.inner.lock().await;
        guard.base.clone()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
