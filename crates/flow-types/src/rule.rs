//! Installable flow rule definition.

use crate::TableId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The flow definition pushed to a device table.
///
/// The reconciliation engine treats the rule as an opaque payload; only
/// [`goto_table`](FlowRule::goto_table) is inspected, since install and
/// delete ordering must respect goto-table dependencies between tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRule {
    /// Match priority within the table.
    pub priority: u16,
    /// Opaque cookie carried through to the device.
    pub cookie: u64,
    /// Textual match specification (e.g., "in_port=3,dl_type=0x0800").
    pub match_spec: String,
    /// Action list applied on match.
    pub actions: Vec<String>,
    /// Table this rule jumps to, if it ends in a goto-table action.
    pub goto_table: Option<TableId>,
}

impl FlowRule {
    /// Creates a rule with the given priority and match specification.
    pub fn new(priority: u16, match_spec: impl Into<String>) -> Self {
        Self {
            priority,
            cookie: 0,
            match_spec: match_spec.into(),
            actions: Vec::new(),
            goto_table: None,
        }
    }

    /// Sets the cookie.
    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    /// Appends an action.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Sets the goto-table target.
    pub fn with_goto_table(mut self, table: TableId) -> Self {
        self.goto_table = Some(table);
        self
    }

    /// Returns true if this rule references another table.
    pub fn has_table_dependency(&self) -> bool {
        self.goto_table.is_some()
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prio={} match=[{}]", self.priority, self.match_spec)?;
        if let Some(goto) = self.goto_table {
            write!(f, " goto={}", goto.as_u8())?;
        }
        Ok(())
    }
}
