//! Flow and owner identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a flow, unique within one table on one device.
///
/// Flow keys are opaque non-empty strings assigned by the desired-state
/// producer (typically derived from the rendered path and hop).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowKey(String);

impl FlowKey {
    /// Creates a new flow key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ParseError> {
        let key = key.into();
        if key.is_empty() {
            Err(ParseError::EmptyFlowKey)
        } else {
            Ok(FlowKey(key))
        }
    }

    /// Returns the flow key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowKey::new(s)
    }
}

impl TryFrom<String> for FlowKey {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FlowKey::new(s)
    }
}

impl From<FlowKey> for String {
    fn from(key: FlowKey) -> String {
        key.0
    }
}

/// Identifier of the higher-level request that caused a flow to exist.
///
/// Several owners may share one physical flow; the store reference-counts
/// owners per flow entry and the entry is removed from the device only
/// when its last owner lets go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct OwnerId(u64);

impl OwnerId {
    /// Creates a new owner id.
    pub const fn new(id: u64) -> Self {
        OwnerId(id)
    }

    /// Returns the owner id as a u64.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner {}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u64 = s
            .parse()
            .map_err(|_| ParseError::InvalidOwnerId(s.to_string()))?;
        Ok(OwnerId(id))
    }
}

impl From<u64> for OwnerId {
    fn from(id: u64) -> Self {
        OwnerId(id)
    }
}

impl From<OwnerId> for u64 {
    fn from(owner: OwnerId) -> u64 {
        owner.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flow_key() {
        let key = FlowKey::new("path-1-hop-2").unwrap();
        assert_eq!(key.as_str(), "path-1-hop-2");
        assert_eq!(FlowKey::new(""), Err(ParseError::EmptyFlowKey));
    }

    #[test]
    fn test_flow_key_ordering() {
        let a = FlowKey::new("a").unwrap();
        let b = FlowKey::new("b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_owner_id() {
        let owner = OwnerId::new(7);
        assert_eq!(owner.as_u64(), 7);
        assert_eq!(owner.to_string(), "owner 7");

        let parsed: OwnerId = "7".parse().unwrap();
        assert_eq!(parsed, owner);
        assert!("abc".parse::<OwnerId>().is_err());
    }
}
