//! Device name type with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a network device (e.g., an OpenFlow switch node).
///
/// Device names are opaque non-empty strings. The reconciliation engine
/// partitions all state by device name, so two devices with the same name
/// are the same device.
///
/// # Examples
///
/// ```
/// use flow_types::DeviceName;
///
/// let dev = DeviceName::new("openflow:1").unwrap();
/// assert_eq!(dev.as_str(), "openflow:1");
///
/// // Empty names are rejected
/// assert!(DeviceName::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName(String);

impl DeviceName {
    /// Creates a new device name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, ParseError> {
        let name = name.into();
        if name.is_empty() {
            Err(ParseError::EmptyDeviceName)
        } else {
            Ok(DeviceName(name))
        }
    }

    /// Returns the device name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceName::new(s)
    }
}

impl TryFrom<String> for DeviceName {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DeviceName::new(s)
    }
}

impl From<DeviceName> for String {
    fn from(name: DeviceName) -> String {
        name.0
    }
}
