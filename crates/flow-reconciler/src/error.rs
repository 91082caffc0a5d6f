//! Error taxonomy for reconciliation operations.
//!
//! The split that matters is retryable versus fatal: transient transport
//! errors (timeouts, device busy) are retried with backoff, validation
//! errors are fatal for that single operation, and store inconsistencies
//! indicate desynchronization between planner and store rather than a
//! crash-worthy condition.

use flow_types::{DeviceName, FlowEntryKey};
use thiserror::Error;

/// Error returned by the device transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transient condition (timeout, device busy); eligible for retry.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The device rejected the operation (malformed flow, unknown table);
    /// never retried.
    #[error("device rejected operation: {0}")]
    Validation(String),

    /// The flow was not present on the device (delete only).
    #[error("flow not found on device")]
    NotFound,
}

impl TransportError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        TransportError::Transient(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        TransportError::Validation(message.into())
    }

    /// Returns true if the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Error returned by [`DeviceFlowStore`](crate::DeviceFlowStore) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No entry exists for the given key on the given device.
    #[error("no flow entry {key} on {device}")]
    NotFound {
        device: DeviceName,
        key: FlowEntryKey,
    },
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(device: DeviceName, key: FlowEntryKey) -> Self {
        StoreError::NotFound { device, key }
    }
}

/// Per-operation failure recorded in an apply outcome.
///
/// These never propagate past the applier; they are captured into the
/// outcome's failure map and surfaced wholesale by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The transport rejected the operation, or retries were exhausted.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The per-key serialization lock could not be acquired within budget;
    /// the operation is picked up again by the next cycle.
    #[error("in-flight lock not acquired within budget for {key}")]
    LockTimeout { key: FlowEntryKey },

    /// The store and planner disagreed about an entry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    /// Returns true if a later reconciliation cycle could succeed where
    /// this operation failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApplyError::Transport(e) => e.is_retryable(),
            ApplyError::LockTimeout { .. } => true,
            ApplyError::Store(_) => false,
        }
    }
}
