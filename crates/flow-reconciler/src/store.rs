//! Per-device index of programmed flows with owner reference counting.

use flow_types::{DeviceName, FlowEntryKey, FlowRecord, OwnerId};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// One programmed flow entry together with the owners referencing it.
///
/// The owner set is never empty while the entry exists: the last
/// `record_removed` deletes the entry outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// The record as confirmed applied on the device.
    pub record: FlowRecord,
    /// Owners currently referencing this physical flow.
    pub owners: BTreeSet<OwnerId>,
}

impl FlowEntry {
    fn new(record: FlowRecord, owner: OwnerId) -> Self {
        let mut owners = BTreeSet::new();
        owners.insert(owner);
        Self { record, owners }
    }
}

/// Flows for one device, keyed by `(table, flow key)`.
///
/// BTreeMap keeps snapshots deterministically ordered.
#[derive(Debug, Default)]
struct Partition {
    entries: BTreeMap<FlowEntryKey, FlowEntry>,
}

/// Index of flows currently believed present on real devices.
///
/// The store is partitioned by device name and every partition is guarded
/// by its own async mutex, so mutations are serialized per device while
/// distinct devices proceed independently. An entry exists in the store if
/// and only if it is currently believed present on the device: the applier
/// updates the store only after the transport confirms a change, never
/// speculatively.
#[derive(Debug, Default)]
pub struct DeviceFlowStore {
    partitions: std::sync::Mutex<HashMap<DeviceName, Arc<Mutex<Partition>>>>,
}

impl DeviceFlowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the partition for a device, creating it if needed.
    fn partition(&self, device: &DeviceName) -> Arc<Mutex<Partition>> {
        let mut partitions = self.partitions.lock().expect("partition map poisoned");
        partitions.entry(device.clone()).or_default().clone()
    }

    /// Returns the partition for a device without creating it.
    fn existing_partition(&self, device: &DeviceName) -> Option<Arc<Mutex<Partition>>> {
        let partitions = self.partitions.lock().expect("partition map poisoned");
        partitions.get(device).cloned()
    }

    /// Returns a consistent point-in-time view of a device's flow entries,
    /// ordered by `(table, flow key)`.
    pub async fn snapshot(&self, device: &DeviceName) -> Vec<FlowEntry> {
        match self.existing_partition(device) {
            Some(partition) => {
                let partition = partition.lock().await;
                partition.entries.values().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Records a confirmed flow installation.
    ///
    /// If the `(table, flow key)` entry already exists, the owner is added
    /// to its owner set (idempotent); otherwise the entry is created with
    /// that single owner.
    pub async fn record_applied(&self, record: &FlowRecord, owner: OwnerId) {
        let partition = self.partition(record.device());
        let mut partition = partition.lock().await;
        let key = record.entry_key();
        match partition.entries.get_mut(&key) {
            Some(entry) => {
                if entry.owners.insert(owner) {
                    debug!("{}: {} gained {}", record.device(), key, owner);
                }
            }
            None => {
                debug!("{}: {} created by {}", record.device(), key, owner);
                partition
                    .entries
                    .insert(key, FlowEntry::new(record.clone(), owner));
            }
        }
    }

    /// Records the release of one owner's reference to a flow entry.
    ///
    /// Removes the owner from the entry's owner set; when the set becomes
    /// empty the entry itself is deleted. Returns `true` if the entry was
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no entry exists for the key.
    /// This never auto-creates or silently ignores missing entries.
    pub async fn record_removed(
        &self,
        device: &DeviceName,
        key: &FlowEntryKey,
        owner: OwnerId,
    ) -> Result<bool, StoreError> {
        let partition = self
            .existing_partition(device)
            .ok_or_else(|| StoreError::not_found(device.clone(), key.clone()))?;
        let mut partition = partition.lock().await;
        let entry = partition
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(device.clone(), key.clone()))?;

        if !entry.owners.remove(&owner) {
            debug!("{}: {} was not an owner of {}", device, owner, key);
        }
        if entry.owners.is_empty() {
            partition.entries.remove(key);
            debug!("{}: {} removed (last owner released)", device, key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Adds an owner reference to an existing entry without touching the
    /// device. Fails if the entry does not exist.
    pub async fn attach_owner(
        &self,
        device: &DeviceName,
        key: &FlowEntryKey,
        owner: OwnerId,
    ) -> Result<(), StoreError> {
        let partition = self
            .existing_partition(device)
            .ok_or_else(|| StoreError::not_found(device.clone(), key.clone()))?;
        let mut partition = partition.lock().await;
        let entry = partition
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(device.clone(), key.clone()))?;
        entry.owners.insert(owner);
        Ok(())
    }

    /// Returns the owners of an entry, if it exists.
    pub async fn owners(&self, device: &DeviceName, key: &FlowEntryKey) -> Option<BTreeSet<OwnerId>> {
        let partition = self.existing_partition(device)?;
        let partition = partition.lock().await;
        partition.entries.get(key).map(|e| e.owners.clone())
    }

    /// Returns true if an entry exists for the key.
    pub async fn contains(&self, device: &DeviceName, key: &FlowEntryKey) -> bool {
        match self.existing_partition(device) {
            Some(partition) => partition.lock().await.entries.contains_key(key),
            None => false,
        }
    }

    /// Returns the number of entries for a device.
    pub async fn entry_count(&self, device: &DeviceName) -> usize {
        match self.existing_partition(device) {
            Some(partition) => partition.lock().await.entries.len(),
            None => 0,
        }
    }

    /// Returns the devices with at least one entry.
    pub async fn devices(&self) -> Vec<DeviceName> {
        let partitions: Vec<(DeviceName, Arc<Mutex<Partition>>)> = {
            let map = self.partitions.lock().expect("partition map poisoned");
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut devices = Vec::new();
        for (device, partition) in partitions {
            if !partition.lock().await.entries.is_empty() {
                devices.push(device);
            }
        }
        devices.sort();
        devices
    }
}
