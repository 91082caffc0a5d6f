//! Immutable flow record bound to a device, table and owner.

use crate::{DeviceName, FlowKey, FlowRule, OwnerId, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage key of a flow within one device: `(table, flow key)`.
///
/// The owner and payload are deliberately not part of the key, so several
/// owners can reference the same physical flow entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowEntryKey {
    /// Table the flow lives in.
    pub table: TableId,
    /// Flow identifier within the table.
    pub flow: FlowKey,
}

impl FlowEntryKey {
    /// Creates a new entry key.
    pub fn new(table: TableId, flow: FlowKey) -> Self {
        Self { table, flow }
    }
}

impl fmt::Display for FlowEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.flow)
    }
}

/// Immutable description of one forwarding entry instance.
///
/// A record remembers enough about a previously issued flow to re-apply or
/// delete it later: the target device, the table and flow identifiers, the
/// payload (absent for deletion records), and the owning request.
///
/// Equality and hashing are structural over all five fields, so records can
/// be used as set and map members. The *storage* identity used by the store
/// is narrower: `(device, table, flow key)` — see [`FlowRecord::entry_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRecord {
    device: DeviceName,
    table: TableId,
    flow: FlowKey,
    rule: Option<FlowRule>,
    owner: OwnerId,
}

impl FlowRecord {
    /// Creates a record for a flow to be installed.
    pub fn new(
        device: DeviceName,
        table: TableId,
        flow: FlowKey,
        rule: FlowRule,
        owner: OwnerId,
    ) -> Self {
        Self {
            device,
            table,
            flow,
            rule: Some(rule),
            owner,
        }
    }

    /// Creates a record for a flow to be deleted.
    ///
    /// Deletion needs only the identifiers, so the payload is absent.
    pub fn for_delete(device: DeviceName, table: TableId, flow: FlowKey, owner: OwnerId) -> Self {
        Self {
            device,
            table,
            flow,
            rule: None,
            owner,
        }
    }

    /// Returns the target device.
    pub fn device(&self) -> &DeviceName {
        &self.device
    }

    /// Returns the table identifier.
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Returns the flow identifier.
    pub fn flow(&self) -> &FlowKey {
        &self.flow
    }

    /// Returns the flow payload, if present.
    pub fn rule(&self) -> Option<&FlowRule> {
        self.rule.as_ref()
    }

    /// Returns the owning request.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns true if this record carries no payload (a deletion record).
    pub fn is_delete(&self) -> bool {
        self.rule.is_none()
    }

    /// Returns the within-device storage key `(table, flow key)`.
    pub fn entry_key(&self) -> FlowEntryKey {
        FlowEntryKey::new(self.table, self.flow.clone())
    }

    /// Returns a copy of this record re-attributed to a different owner.
    ///
    /// Used when a second request adopts an already-programmed flow.
    pub fn with_owner(&self, owner: OwnerId) -> Self {
        Self {
            owner,
            ..self.clone()
        }
    }
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{} ({})",
            self.device, self.table, self.flow, self.owner
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn record() -> FlowRecord {
        FlowRecord::new(
            DeviceName::new("openflow:1").unwrap(),
            TableId::new(2),
            FlowKey::new("f1").unwrap(),
            FlowRule::new(100, "in_port=1"),
            OwnerId::new(7),
        )
    }

    fn hash_of(record: &FlowRecord) -> u64 {
        let mut hasher = DefaultHasher::new();
        record.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_records_have_equal_hash() {
        let a = record();
        let b = record();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_any_single_field_difference_breaks_equality() {
        let base = record();

        let other_device = FlowRecord::new(
            DeviceName::new("openflow:2").unwrap(),
            base.table(),
            base.flow().clone(),
            base.rule().unwrap().clone(),
            base.owner(),
        );
        assert_ne!(base, other_device);

        let other_table = FlowRecord::new(
            base.device().clone(),
            TableId::new(3),
            base.flow().clone(),
            base.rule().unwrap().clone(),
            base.owner(),
        );
        assert_ne!(base, other_table);

        let other_flow = FlowRecord::new(
            base.device().clone(),
            base.table(),
            FlowKey::new("f2").unwrap(),
            base.rule().unwrap().clone(),
            base.owner(),
        );
        assert_ne!(base, other_flow);

        let other_rule = FlowRecord::new(
            base.device().clone(),
            base.table(),
            base.flow().clone(),
            FlowRule::new(200, "in_port=1"),
            base.owner(),
        );
        assert_ne!(base, other_rule);

        let other_owner = base.with_owner(OwnerId::new(8));
        assert_ne!(base, other_owner);
    }

    #[test]
    fn test_delete_record_has_no_payload() {
        let del = FlowRecord::for_delete(
            DeviceName::new("openflow:1").unwrap(),
            TableId::new(2),
            FlowKey::new("f1").unwrap(),
            OwnerId::new(7),
        );
        assert!(del.is_delete());
        assert!(del.rule().is_none());
        // Identifiers match the install record; payload does not
        assert_eq!(del.entry_key(), record().entry_key());
        assert_ne!(del, record());
    }

    #[test]
    fn test_entry_key_excludes_owner_and_payload() {
        let a = record();
        let b = a.with_owner(OwnerId::new(99));
        assert_eq!(a.entry_key(), b.entry_key());
    }

    #[test]
    fn test_entry_key_ordering() {
        let k1 = FlowEntryKey::new(TableId::new(1), FlowKey::new("b").unwrap());
        let k2 = FlowEntryKey::new(TableId::new(2), FlowKey::new("a").unwrap());
        let k3 = FlowEntryKey::new(TableId::new(2), FlowKey::new("b").unwrap());
        assert!(k1 < k2);
        assert!(k2 < k3);
    }

    #[test]
    fn test_serde_round_trip() {
        let a = record();
        let json = serde_json::to_string(&a).unwrap();
        let back: FlowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
