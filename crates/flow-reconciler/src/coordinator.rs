//! Cross-device reconciliation orchestration.

use flow_types::{DeviceName, FlowRecord, OwnerId};
use log::{debug, error, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::applier::{ApplyOutcome, FlowApplier};
use crate::config::ReconcilerConfig;
use crate::planner::plan;
use crate::store::DeviceFlowStore;
use crate::transport::FlowTransport;

/// Desired state for one device in one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct DeviceIntent {
    /// Owners this run is authoritative for. Only their references may be
    /// released; flows held by other owners are left alone.
    pub owners: BTreeSet<OwnerId>,
    /// Flow records that should exist on the device.
    pub records: Vec<FlowRecord>,
}

impl DeviceIntent {
    /// Creates an intent scoped to the owners appearing in `records`.
    pub fn new(records: Vec<FlowRecord>) -> Self {
        let owners = records.iter().map(FlowRecord::owner).collect();
        Self { owners, records }
    }

    /// Adds an owner to the scope without desired records, expressing
    /// "remove everything this owner holds".
    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owners.insert(owner);
        self
    }
}

/// Overall verdict of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStatus {
    /// Every device converged without failures.
    Success,
    /// Some flows failed but at least one device made progress.
    Degraded,
    /// Every device recorded failures and none made any progress.
    ///
    /// A device that applied even one operation counts as progress, so a
    /// run where every device failed partially still reports [`Degraded`]
    /// (re-running converges the remainder).
    ///
    /// [`Degraded`]: ReconcileStatus::Degraded
    Failed,
}

/// Result of one reconciliation run, per device and overall.
#[derive(Debug, Clone)]
pub struct ReconcileResult {
    /// Aggregate verdict.
    pub status: ReconcileStatus,
    /// Per-device outcomes, including per-flow failure reasons.
    pub outcomes: HashMap<DeviceName, ApplyOutcome>,
}

impl ReconcileResult {
    /// Returns the outcome for one device, if it was part of the run.
    pub fn outcome(&self, device: &DeviceName) -> Option<&ApplyOutcome> {
        self.outcomes.get(device)
    }

    /// Devices whose outcome carries at least one failure.
    pub fn degraded_devices(&self) -> Vec<&DeviceName> {
        let mut devices: Vec<&DeviceName> = self
            .outcomes
            .iter()
            .filter(|(_, o)| !o.failures.is_empty())
            .map(|(d, _)| d)
            .collect();
        devices.sort();
        devices
    }
}

/// Runs plan + apply cycles across many devices concurrently.
///
/// Devices are independent failure domains: one logical task per device
/// per cycle, a bounded worker pool, and no ordering across devices.
/// Re-invoking with the same desired state after a partial failure
/// recomputes the diff against the updated store and retries only what
/// remains divergent.
pub struct ReconciliationCoordinator {
    store: Arc<DeviceFlowStore>,
    applier: Arc<FlowApplier>,
    workers: Arc<Semaphore>,
}

impl ReconciliationCoordinator {
    /// Creates a coordinator over the given store and transport.
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<DeviceFlowStore>,
        transport: Arc<dyn FlowTransport>,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_pool_size));
        let applier = Arc::new(FlowApplier::new(
            config,
            Arc::clone(&store),
            transport,
        ));
        Self {
            store,
            applier,
            workers,
        }
    }

    /// Converges every device in `desired` toward its intent.
    pub async fn reconcile(
        &self,
        desired: HashMap<DeviceName, DeviceIntent>,
        cancel: &CancellationToken,
    ) -> ReconcileResult {
        let mut tasks: JoinSet<(DeviceName, ApplyOutcome)> = JoinSet::new();

        for (device, intent) in desired {
            let workers = Arc::clone(&self.workers);
            let store = Arc::clone(&self.store);
            let applier = Arc::clone(&self.applier);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    // Pool closed; treat as an unattempted cycle.
                    return (device, ApplyOutcome::default());
                };

                let snapshot = store.snapshot(&device).await;
                let diff = plan(&intent.records, &intent.owners, &snapshot);
                if diff.is_empty() {
                    debug!("{}: already converged", device);
                    return (device, ApplyOutcome::default());
                }

                let outcome = applier.apply(&device, diff, &cancel).await;
                (device, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, outcome)) => {
                    outcomes.insert(device, outcome);
                }
                Err(e) => error!("device reconciliation task aborted: {}", e),
            }
        }

        let status = Self::classify(&outcomes);
        info!(
            "reconciliation finished: {:?} across {} devices",
            status,
            outcomes.len()
        );
        ReconcileResult { status, outcomes }
    }

    /// A device counts as failed only when it has failures and made no
    /// progress at all; the run is `Failed` only if every device did.
    fn classify(outcomes: &HashMap<DeviceName, ApplyOutcome>) -> ReconcileStatus {
        let any_failures = outcomes.values().any(|o| !o.failures.is_empty());
        if !any_failures {
            return ReconcileStatus::Success;
        }
        let all_failed = outcomes
            .values()
            .all(|o| !o.failures.is_empty() && !o.has_progress());
        if all_failed {
            ReconcileStatus::Failed
        } else {
            ReconcileStatus::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApplyError, TransportError};
    use async_trait::async_trait;
    use flow_types::{FlowEntryKey, FlowKey, FlowRule, TableId};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn device(n: u32) -> DeviceName {
        DeviceName::new(format!("openflow:{}", n)).unwrap()
    }

    fn record(dev: u32, table: u8, flow: &str, owner: u64) -> FlowRecord {
        FlowRecord::new(
            device(dev),
            TableId::new(table),
            FlowKey::new(flow).unwrap(),
            FlowRule::new(100, "in_port=1"),
            OwnerId::new(owner),
        )
    }

    /// Transport that accepts everything and counts pushes per device.
    struct CountingTransport {
        pushes: Mutex<HashMap<DeviceName, usize>>,
    }

    impl CountingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pushes: Mutex::new(HashMap::new()),
            })
        }

        fn pushes_for(&self, device: &DeviceName) -> usize {
            *self.pushes.lock().unwrap().get(device).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl FlowTransport for CountingTransport {
        async fn push(
            &self,
            device: &DeviceName,
            _table: TableId,
            _flow: &FlowKey,
            _rule: &FlowRule,
        ) -> Result<(), TransportError> {
            *self.pushes.lock().unwrap().entry(device.clone()).or_insert(0) += 1;
            Ok(())
        }

        async fn delete(
            &self,
            _device: &DeviceName,
            _table: TableId,
            _flow: &FlowKey,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn outcome_with_failure() -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        outcome.failures.insert(
            FlowEntryKey::new(TableId::new(1), FlowKey::new("f").unwrap()),
            ApplyError::from(TransportError::validation("bad")),
        );
        outcome
    }

    fn outcome_with_progress_and_failure() -> ApplyOutcome {
        let mut outcome = outcome_with_failure();
        outcome
            .applied_adds
            .push(FlowEntryKey::new(TableId::new(2), FlowKey::new("g").unwrap()));
        outcome
    }

    #[test]
    fn test_classify_success() {
        let outcomes = HashMap::from([(device(1), ApplyOutcome::default())]);
        assert_eq!(
            ReconciliationCoordinator::classify(&outcomes),
            ReconcileStatus::Success
        );
        assert_eq!(
            ReconciliationCoordinator::classify(&HashMap::new()),
            ReconcileStatus::Success
        );
    }

    #[test]
    fn test_classify_degraded_when_any_device_has_failures() {
        let outcomes = HashMap::from([
            (device(1), ApplyOutcome::default()),
            (device(2), outcome_with_failure()),
        ]);
        assert_eq!(
            ReconciliationCoordinator::classify(&outcomes),
            ReconcileStatus::Degraded
        );
    }

    #[test]
    fn test_classify_degraded_on_partial_progress() {
        let outcomes = HashMap::from([(device(1), outcome_with_progress_and_failure())]);
        assert_eq!(
            ReconciliationCoordinator::classify(&outcomes),
            ReconcileStatus::Degraded
        );
    }

    #[test]
    fn test_classify_degraded_when_all_fail_but_one_progressed() {
        // Partial progress anywhere keeps the run out of Failed.
        let outcomes = HashMap::from([
            (device(1), outcome_with_failure()),
            (device(2), outcome_with_progress_and_failure()),
        ]);
        assert_eq!(
            ReconciliationCoordinator::classify(&outcomes),
            ReconcileStatus::Degraded
        );
    }

    #[test]
    fn test_classify_failed_when_all_devices_failed() {
        let outcomes = HashMap::from([
            (device(1), outcome_with_failure()),
            (device(2), outcome_with_failure()),
        ]);
        assert_eq!(
            ReconciliationCoordinator::classify(&outcomes),
            ReconcileStatus::Failed
        );
    }

    #[test]
    fn test_device_intent_scope_derived_from_records() {
        let intent = DeviceIntent::new(vec![record(1, 0, "a", 3), record(1, 1, "b", 5)]);
        assert_eq!(
            intent.owners,
            BTreeSet::from([OwnerId::new(3), OwnerId::new(5)])
        );

        let intent = intent.with_owner(OwnerId::new(9));
        assert!(intent.owners.contains(&OwnerId::new(9)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconcile_fans_out_across_devices() {
        let transport = CountingTransport::new();
        let store = Arc::new(DeviceFlowStore::new());
        let coordinator = ReconciliationCoordinator::new(
            ReconcilerConfig::default().with_worker_pool_size(2),
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn FlowTransport>,
        );

        let desired = HashMap::from([
            (device(1), DeviceIntent::new(vec![record(1, 0, "a", 1)])),
            (device(2), DeviceIntent::new(vec![record(2, 0, "a", 1), record(2, 1, "b", 1)])),
            (device(3), DeviceIntent::new(vec![record(3, 0, "a", 1)])),
        ]);

        let result = coordinator
            .reconcile(desired, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ReconcileStatus::Success);
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(transport.pushes_for(&device(1)), 1);
        assert_eq!(transport.pushes_for(&device(2)), 2);
        assert_eq!(transport.pushes_for(&device(3)), 1);
        assert_eq!(store.entry_count(&device(2)).await, 2);
        assert!(result.degraded_devices().is_empty());
    }
}
