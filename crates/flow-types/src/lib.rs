//! Core types for SDN flow programming.
//!
//! This crate provides type-safe representations of the identifiers and
//! values used by the flow reconciliation engine:
//!
//! - [`DeviceName`]: identifier of a network device
//! - [`TableId`]: forwarding table number on a device
//! - [`FlowKey`]: flow identifier, unique within one table
//! - [`OwnerId`]: higher-level request that caused a flow to exist
//! - [`FlowRule`]: the installable flow definition (match, actions, priority)
//! - [`FlowRecord`]: immutable binding of a rule to a device, table and owner

mod device;
mod flow;
mod record;
mod rule;
mod table;

pub use device::DeviceName;
pub use flow::{FlowKey, OwnerId};
pub use record::{FlowEntryKey, FlowRecord};
pub use rule::FlowRule;
pub use table::TableId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("device name must not be empty")]
    EmptyDeviceName,

    #[error("flow key must not be empty")]
    EmptyFlowKey,

    #[error("invalid table id: {0}")]
    InvalidTableId(String),

    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),
}
