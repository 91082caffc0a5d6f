//! Applies a planned diff to one device through the transport.

use flow_types::{DeviceName, FlowEntryKey, FlowRecord};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;
use crate::error::{ApplyError, TransportError};
use crate::planner::{FlowDelete, FlowDiff, OwnerOp, OwnerUpdate};
use crate::store::DeviceFlowStore;
use crate::transport::FlowTransport;

/// Set of `(device, table, flow)` keys with an operation in flight.
///
/// At most one operation per key is ever outstanding: a second
/// reconciliation cycle touching the same key waits here until the first
/// cycle's operation completes, up to the configured budget.
#[derive(Debug, Default)]
pub(crate) struct KeyLockSet {
    held: Mutex<HashSet<(DeviceName, FlowEntryKey)>>,
    released: Notify,
}

impl KeyLockSet {
    /// Tries to claim the key within `budget`. Returns `None` on timeout.
    async fn acquire(
        self: &Arc<Self>,
        device: &DeviceName,
        key: &FlowEntryKey,
        budget: Duration,
    ) -> Option<KeyLockGuard> {
        let token = (device.clone(), key.clone());
        let claimed = tokio::time::timeout(budget, async {
            loop {
                // Register for wakeup before checking, so a release between
                // the check and the await is not missed.
                let released = self.released.notified();
                {
                    let mut held = self.held.lock().expect("key lock set poisoned");
                    if held.insert(token.clone()) {
                        return;
                    }
                }
                released.await;
            }
        })
        .await;

        claimed.ok().map(|()| KeyLockGuard {
            set: Arc::clone(self),
            token,
        })
    }

    fn release(&self, token: &(DeviceName, FlowEntryKey)) {
        self.held
            .lock()
            .expect("key lock set poisoned")
            .remove(token);
        self.released.notify_waiters();
    }
}

/// Releases the claimed key on drop, even if the operation panicked.
struct KeyLockGuard {
    set: Arc<KeyLockSet>,
    token: (DeviceName, FlowEntryKey),
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.set.release(&self.token);
    }
}

/// Aggregate result of applying one diff to one device.
///
/// Individual failures never abort sibling operations; everything that
/// went wrong is collected here and surfaced to the caller wholesale.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// Keys of flows confirmed installed.
    pub applied_adds: Vec<FlowEntryKey>,
    /// Keys of flows confirmed deleted.
    pub applied_deletes: Vec<FlowEntryKey>,
    /// Number of owner-set updates applied to the store.
    pub owner_updates: usize,
    /// Per-flow failures, keyed by the flow's storage key.
    pub failures: HashMap<FlowEntryKey, ApplyError>,
    /// True if the cycle was cancelled before completing; remaining
    /// operations were left unattempted and are not counted as failures.
    pub cancelled: bool,
}

impl ApplyOutcome {
    /// Returns true if every scheduled operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Returns true if at least one operation took effect.
    pub fn has_progress(&self) -> bool {
        !self.applied_adds.is_empty() || !self.applied_deletes.is_empty() || self.owner_updates > 0
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} adds, {} deletes, {} owner updates, {} failures{}",
            self.applied_adds.len(),
            self.applied_deletes.len(),
            self.owner_updates,
            self.failures.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Pushes a planned diff to a device with retry, per-key serialization and
/// confirmed-only store updates.
pub struct FlowApplier {
    config: ReconcilerConfig,
    store: Arc<DeviceFlowStore>,
    transport: Arc<dyn FlowTransport>,
    locks: Arc<KeyLockSet>,
}

impl FlowApplier {
    /// Creates a new applier.
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<DeviceFlowStore>,
        transport: Arc<dyn FlowTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            locks: Arc::new(KeyLockSet::default()),
        }
    }

    /// Applies a diff to one device.
    ///
    /// Operations run in the planner's order: adds, then owner updates,
    /// then deletes. The cancellation token is checked before each
    /// operation; an operation already handed to the transport runs to
    /// completion and its result is still recorded in the store.
    pub async fn apply(
        &self,
        device: &DeviceName,
        diff: FlowDiff,
        cancel: &CancellationToken,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        debug!("{}: applying {}", device, diff);

        for record in &diff.to_add {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            self.apply_add(device, record, &mut outcome).await;
        }

        for update in &diff.owner_updates {
            if outcome.cancelled || cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            self.apply_owner_update(device, update, &mut outcome).await;
        }

        for delete in &diff.to_delete {
            if outcome.cancelled || cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            self.apply_delete(device, delete, &mut outcome).await;
        }

        debug!("{}: apply finished: {}", device, outcome);
        outcome
    }

    async fn apply_add(
        &self,
        device: &DeviceName,
        record: &FlowRecord,
        outcome: &mut ApplyOutcome,
    ) {
        let key = record.entry_key();
        let Some(rule) = record.rule() else {
            // The planner filters these out before they get here.
            warn!("{}: add for {} carries no payload, skipping", device, key);
            return;
        };

        let Some(_guard) = self
            .locks
            .acquire(device, &key, self.config.per_device_lock_timeout)
            .await
        else {
            warn!("{}: in-flight lock budget exhausted for {}", device, key);
            outcome
                .failures
                .insert(key.clone(), ApplyError::LockTimeout { key });
            return;
        };

        let result = self
            .with_retry(&key, || {
                self.transport.push(device, record.table(), record.flow(), rule)
            })
            .await;

        match result {
            Ok(()) => {
                self.store.record_applied(record, record.owner()).await;
                outcome.applied_adds.push(key);
            }
            Err(e) => {
                warn!("{}: push of {} failed: {}", device, key, e);
                outcome.failures.insert(key, e.into());
            }
        }
    }

    async fn apply_owner_update(
        &self,
        device: &DeviceName,
        update: &OwnerUpdate,
        outcome: &mut ApplyOutcome,
    ) {
        match update.op {
            OwnerOp::Attach => {
                match self.store.attach_owner(device, &update.key, update.owner).await {
                    Ok(()) => outcome.owner_updates += 1,
                    // The entry this attach depended on was never installed
                    // (its add failed earlier in this cycle).
                    Err(e) => {
                        warn!("{}: attach to {} failed: {}", device, update.key, e);
                        outcome.failures.insert(update.key.clone(), e.into());
                    }
                }
            }
            OwnerOp::Detach => {
                match self.store.record_removed(device, &update.key, update.owner).await {
                    Ok(entry_removed) => {
                        if entry_removed {
                            warn!(
                                "{}: detach of {} dropped the last owner of {} with no device delete scheduled",
                                device, update.owner, update.key
                            );
                        }
                        outcome.owner_updates += 1;
                    }
                    Err(e) => {
                        // Already absent: planner/store drift, skip.
                        warn!("{}: detach from {} skipped: {}", device, update.key, e);
                    }
                }
            }
        }
    }

    async fn apply_delete(
        &self,
        device: &DeviceName,
        delete: &FlowDelete,
        outcome: &mut ApplyOutcome,
    ) {
        let key = &delete.key;

        let Some(_guard) = self
            .locks
            .acquire(device, key, self.config.per_device_lock_timeout)
            .await
        else {
            warn!("{}: in-flight lock budget exhausted for {}", device, key);
            outcome
                .failures
                .insert(key.clone(), ApplyError::LockTimeout { key: key.clone() });
            return;
        };

        let result = self
            .with_retry(key, || self.transport.delete(device, key.table, &key.flow))
            .await;

        match result {
            Ok(()) | Err(TransportError::NotFound) => {
                if matches!(result, Err(TransportError::NotFound)) {
                    warn!("{}: {} already absent on device", device, key);
                }
                for owner in &delete.owners {
                    if let Err(e) = self.store.record_removed(device, key, *owner).await {
                        warn!("{}: store release of {} skipped: {}", device, key, e);
                        break;
                    }
                }
                outcome.applied_deletes.push(key.clone());
            }
            Err(e) => {
                warn!("{}: delete of {} failed: {}", device, key, e);
                outcome.failures.insert(key.clone(), e.into());
            }
        }
    }

    /// Runs one transport call with per-call timeout and bounded
    /// exponential backoff. Only transient errors are retried; timeouts
    /// count as transient.
    async fn with_retry<F, Fut>(&self, key: &FlowEntryKey, op: F) -> Result<(), TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.config.op_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::transient("transport call timed out")),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.config.backoff_for_attempt(attempt);
                    debug!(
                        "attempt {} for {} failed ({}), backing off {:?}",
                        attempt, key, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
