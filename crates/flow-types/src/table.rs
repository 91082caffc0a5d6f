//! Forwarding table identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OpenFlow-style forwarding table number (0-255).
///
/// Tables form an ordered pipeline: a flow in table N may reference a
/// higher-numbered table via a goto-table action. The reconciliation
/// planner relies on this ordering when sequencing installs and deletes.
///
/// # Examples
///
/// ```
/// use flow_types::TableId;
///
/// let t = TableId::new(10);
/// assert_eq!(t.as_u8(), 10);
/// assert!(t < TableId::new(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct TableId(u8);

impl TableId {
    /// The first table in the pipeline.
    pub const INGRESS: TableId = TableId(0);

    /// Creates a new table id.
    pub const fn new(id: u8) -> Self {
        TableId(id)
    }

    /// Returns the table number as a u8.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Returns true if this is the ingress table.
    pub const fn is_ingress(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}", self.0)
    }
}

impl FromStr for TableId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u8 = s
            .parse()
            .map_err(|_| ParseError::InvalidTableId(s.to_string()))?;
        Ok(TableId(id))
    }
}

impl From<u8> for TableId {
    fn from(id: u8) -> Self {
        TableId(id)
    }
}

impl From<TableId> for u8 {
    fn from(table: TableId) -> u8 {
        table.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_and_accessors() {
        let t = TableId::new(42);
        assert_eq!(t.as_u8(), 42);
        assert!(!t.is_ingress());
        assert!(TableId::INGRESS.is_ingress());
    }

    #[test]
    fn test_parse() {
        let t: TableId = "7".parse().unwrap();
        assert_eq!(t, TableId::new(7));
        assert!("x7".parse::<TableId>().is_err());
        assert!("300".parse::<TableId>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(TableId::new(1) < TableId::new(2));
        assert!(TableId::INGRESS < TableId::new(255));
    }

    #[test]
    fn test_display() {
        assert_eq!(TableId::new(3).to_string(), "table 3");
    }
}
