//! Flow-intent reconciliation engine.
//!
//! This crate tracks which forwarding-table entries are currently believed
//! to exist on which network devices, computes the minimal set of additions
//! and deletions needed to converge actual device state to desired state,
//! and issues those changes with at-most-one-in-flight semantics per
//! (device, table, flow) key.
//!
//! # Architecture
//!
//! The engine is layered, leaves first:
//!
//! 1. [`DeviceFlowStore`]: per-device index of programmed flows with
//!    owner-set reference counting
//! 2. [`plan`]: pure diff of desired records against a store snapshot,
//!    ordered so goto-table dependencies are never violated
//! 3. [`FlowApplier`]: pushes a diff through the injected [`FlowTransport`]
//!    with retry/backoff and per-key serialization
//! 4. [`ReconciliationCoordinator`]: fans plan+apply out across devices on
//!    a bounded worker pool and aggregates outcomes
//!
//! # Example
//!
//! ```ignore
//! use flow_reconciler::{DeviceFlowStore, ReconcilerConfig, ReconciliationCoordinator};
//!
//! let store = Arc::new(DeviceFlowStore::new());
//! let coordinator = ReconciliationCoordinator::new(
//!     ReconcilerConfig::default(),
//!     store,
//!     transport, // impl FlowTransport
//! );
//!
//! let result = coordinator.reconcile(desired, &cancel).await;
//! if result.status != ReconcileStatus::Success {
//!     // caller decides whether to re-run
//! }
//! ```

mod applier;
mod config;
mod coordinator;
mod error;
mod planner;
mod store;
mod transport;

pub use applier::{ApplyOutcome, FlowApplier};
pub use config::ReconcilerConfig;
pub use coordinator::{DeviceIntent, ReconcileResult, ReconcileStatus, ReconciliationCoordinator};
pub use error::{ApplyError, StoreError, TransportError};
pub use planner::{plan, FlowDelete, FlowDiff, OwnerOp, OwnerUpdate};
pub use store::{DeviceFlowStore, FlowEntry};
pub use transport::FlowTransport;
