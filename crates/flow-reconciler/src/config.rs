//! Reconciler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the reconciliation engine.
///
/// Every field has a default, so partial configuration files work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Maximum attempts per device operation (transient failures only).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub backoff_base: Duration,
    /// Timeout for a single transport call; expiry counts as transient.
    pub op_timeout: Duration,
    /// Number of device reconciliation tasks allowed to run concurrently.
    pub worker_pool_size: usize,
    /// Budget for acquiring the per-(device, table, flow) in-flight lock.
    pub per_device_lock_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(50),
            op_timeout: Duration::from_secs(5),
            worker_pool_size: 8,
            per_device_lock_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    /// Sets the maximum attempts per operation.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base delay.
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Sets the per-call transport timeout.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Sets the worker pool size.
    pub fn with_worker_pool_size(mut self, worker_pool_size: usize) -> Self {
        self.worker_pool_size = worker_pool_size;
        self
    }

    /// Sets the in-flight lock acquisition budget.
    pub fn with_per_device_lock_timeout(mut self, timeout: Duration) -> Self {
        self.per_device_lock_timeout = timeout;
        self
    }

    /// Returns the backoff delay before the given retry (1-based attempt
    /// number of the attempt that just failed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        // Exponential: base, 2*base, 4*base, ...
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.worker_pool_size, 8);
    }

    #[test]
    fn test_builders() {
        let config = ReconcilerConfig::default()
            .with_max_retries(5)
            .with_backoff_base(Duration::from_millis(10))
            .with_worker_pool_size(2);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, Duration::from_millis(10));
        assert_eq!(config.worker_pool_size, 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ReconcilerConfig =
            serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.backoff_base, Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ReconcilerConfig::default().with_backoff_base(Duration::from_millis(10));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(20));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(40));
    }
}
