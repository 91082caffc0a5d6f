//! Device transport seam.

use async_trait::async_trait;
use flow_types::{DeviceName, FlowKey, FlowRule, TableId};

use crate::error::TransportError;

/// Narrow contract to the device programming layer.
///
/// The engine depends only on this trait, not on any wire format. Real
/// implementations translate the calls into whatever the southbound
/// protocol speaks; tests substitute an in-memory mock.
///
/// Error mapping expected of implementations:
///
/// - timeouts and device-busy conditions map to [`TransportError::Transient`]
/// - malformed flows and unknown tables map to [`TransportError::Validation`]
/// - deleting an absent flow maps to [`TransportError::NotFound`]
#[async_trait]
pub trait FlowTransport: Send + Sync {
    /// Installs a flow in the given device table.
    async fn push(
        &self,
        device: &DeviceName,
        table: TableId,
        flow: &FlowKey,
        rule: &FlowRule,
    ) -> Result<(), TransportError>;

    /// Removes a flow from the given device table.
    async fn delete(
        &self,
        device: &DeviceName,
        table: TableId,
        flow: &FlowKey,
    ) -> Result<(), TransportError>;
}
