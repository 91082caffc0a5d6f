//! Diff computation between desired flow state and a store snapshot.

use flow_types::{FlowEntryKey, FlowRecord, OwnerId};
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::store::FlowEntry;

/// Owner-set change that needs no device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OwnerOp {
    /// Add an owner reference to an existing entry.
    Attach,
    /// Release an owner reference; other owners keep the flow alive.
    Detach,
}

/// A scheduled owner-set update on one store entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OwnerUpdate {
    /// Entry the update applies to.
    pub key: FlowEntryKey,
    /// Owner being attached or detached.
    pub owner: OwnerId,
    /// Direction of the update.
    pub op: OwnerOp,
}

/// A physical flow deletion, carrying every in-scope owner to release once
/// the device confirms. The delete is issued exactly once per entry no
/// matter how many owners shared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowDelete {
    /// Entry to delete from the device.
    pub key: FlowEntryKey,
    /// Owners whose references are released on confirmation.
    pub owners: BTreeSet<OwnerId>,
}

/// Ordered change set for one device.
///
/// Ordering is the correctness-critical policy here:
///
/// - `to_add` is sorted by table number *descending* (then flow key), so a
///   flow's goto-table target is installed before any flow referencing it
/// - `to_delete` is sorted by table number *ascending* (then flow key), so
///   a referencing flow disappears before the table it jumps to is drained
///
/// A device must never observe a flow that jumps to a not-yet-populated
/// table, nor a drained table that live flows still reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowDiff {
    /// Flows to install, in install order.
    pub to_add: Vec<FlowRecord>,
    /// Flows to delete, in delete order.
    pub to_delete: Vec<FlowDelete>,
    /// Owner-set updates with no device operation.
    pub owner_updates: Vec<OwnerUpdate>,
}

impl FlowDiff {
    /// Returns true if the diff schedules no work at all.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty() && self.owner_updates.is_empty()
    }

    /// Total number of scheduled operations.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_delete.len() + self.owner_updates.len()
    }
}

impl fmt::Display for FlowDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} adds, {} deletes, {} owner updates",
            self.to_add.len(),
            self.to_delete.len(),
            self.owner_updates.len()
        )
    }
}

/// Computes the ordered change set converging `current` to `desired`.
///
/// `owners_in_scope` names the owners this reconciliation run speaks for.
/// Only their references may be released: a current entry is physically
/// deleted when nothing desires it *and* every owner holding it is in
/// scope; if out-of-scope owners remain, in-scope references are detached
/// and the flow stays on the device.
///
/// The function is pure and deterministic: the same inputs always produce
/// the same ordered diff.
pub fn plan(
    desired: &[FlowRecord],
    owners_in_scope: &BTreeSet<OwnerId>,
    current: &[FlowEntry],
) -> FlowDiff {
    // Owner-ordered so the add for a shared new key is attributed
    // deterministically to the lowest owner.
    let mut desired_by_key: BTreeMap<FlowEntryKey, BTreeMap<OwnerId, &FlowRecord>> =
        BTreeMap::new();
    for record in desired {
        if record.is_delete() {
            warn!("ignoring payload-less desired record {}", record);
            continue;
        }
        desired_by_key
            .entry(record.entry_key())
            .or_default()
            .insert(record.owner(), record);
    }

    let current_by_key: BTreeMap<FlowEntryKey, &FlowEntry> = current
        .iter()
        .map(|entry| (entry.record.entry_key(), entry))
        .collect();

    let mut diff = FlowDiff::default();

    for (key, wanting) in &desired_by_key {
        match current_by_key.get(key) {
            None => {
                // New physical flow: one add, extra owners attach afterwards.
                let mut wanting = wanting.iter();
                let (_, first) = wanting.next().expect("desired key with no owners");
                diff.to_add.push((*first).clone());
                for (owner, record) in wanting {
                    if record.rule() != first.rule() {
                        warn!(
                            "{}: conflicting payloads desired for {}, keeping the one from {}",
                            record.device(),
                            key,
                            first.owner()
                        );
                    }
                    diff.owner_updates.push(OwnerUpdate {
                        key: key.clone(),
                        owner: *owner,
                        op: OwnerOp::Attach,
                    });
                }
            }
            Some(entry) => {
                // Flow already programmed: only owner-set growth is needed.
                for owner in wanting.keys() {
                    if !entry.owners.contains(owner) {
                        diff.owner_updates.push(OwnerUpdate {
                            key: key.clone(),
                            owner: *owner,
                            op: OwnerOp::Attach,
                        });
                    }
                }
            }
        }
    }

    for (key, entry) in &current_by_key {
        let wanted_by: BTreeSet<OwnerId> = desired_by_key
            .get(key)
            .map(|w| w.keys().copied().collect())
            .unwrap_or_default();

        let stale: BTreeSet<OwnerId> = entry
            .owners
            .iter()
            .filter(|o| owners_in_scope.contains(o) && !wanted_by.contains(o))
            .copied()
            .collect();
        if stale.is_empty() {
            continue;
        }

        let survivors = entry.owners.len() - stale.len();
        if survivors == 0 && wanted_by.is_empty() {
            diff.to_delete.push(FlowDelete {
                key: (*key).clone(),
                owners: stale,
            });
        } else {
            // Someone still references the flow: release only stale owners.
            for owner in stale {
                diff.owner_updates.push(OwnerUpdate {
                    key: (*key).clone(),
                    owner,
                    op: OwnerOp::Detach,
                });
            }
        }
    }

    // Install leaf tables first so goto-table targets always exist.
    diff.to_add.sort_by(|a, b| {
        b.table()
            .cmp(&a.table())
            .then_with(|| a.flow().cmp(b.flow()))
    });
    // Delete referencing flows before the tables they reference.
    diff.to_delete.sort_by(|a, b| a.key.cmp(&b.key));
    // Attaches run before detaches on the same key, so a same-cycle
    // ownership handoff never empties an entry's owner set.
    diff.owner_updates.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| a.op.cmp(&b.op))
            .then_with(|| a.owner.cmp(&b.owner))
    });

    diff
}
