//! Watchpoint registry
//!
//! Stores the watchpoints set by the remote front end, keyed by their
//! caller-assigned id.

mod tests;

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tensorwatch_shared::WatchNode;

use super::condition::WatchCondition;

/// Scope name that matches every node
pub const SCOPE_WILDCARD: &str = "*";

/// Node matcher of a watchpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMatcher {
    /// Node name, or scope prefix when `is_scope` is set
    pub name: String,
    pub is_scope: bool,
}

impl NodeMatcher {
    /// Matcher for exactly one node
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_scope: false,
        }
    }

    /// Matcher for every node under a scope
    pub fn scope(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_scope: true,
        }
    }

    /// Check whether a node name is covered by this matcher
    pub fn matches(&self, node_name: &str) -> bool {
        if self.is_scope {
            self.name == SCOPE_WILDCARD || node_name.starts_with(self.name.as_str())
        } else {
            node_name == self.name
        }
    }
}

impl From<&WatchNode> for NodeMatcher {
    fn from(node: &WatchNode) -> Self {
        Self {
            name: node.node_name.clone(),
            is_scope: node.is_scope,
        }
    }
}

/// A registered watchpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Watchpoint {
    pub id: u32,
    pub condition: WatchCondition,
    pub matchers: SmallVec<[NodeMatcher; 4]>,
}

impl Watchpoint {
    /// Check whether any matcher covers the node
    pub fn watches(&self, node_name: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(node_name))
    }
}

/// Registry of active watchpoints
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    watchpoints: BTreeMap<u32, Watchpoint>,
}

impl WatchRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a watchpoint, replacing any existing one with the same id
    pub fn add_or_replace(
        &mut self,
        id: u32,
        condition: WatchCondition,
        matchers: impl IntoIterator<Item = NodeMatcher>,
    ) {
        let watchpoint = Watchpoint {
            id,
            condition,
            matchers: matchers.into_iter().collect(),
        };
        if self.watchpoints.insert(id, watchpoint).is_some() {
            tracing::debug!(id, "watchpoint replaced");
        }
    }

    /// Remove a watchpoint; unknown ids are ignored
    pub fn remove(&mut self, id: u32) {
        if self.watchpoints.remove(&id).is_none() {
            tracing::debug!(id, "remove of unknown watchpoint ignored");
        }
    }

    /// All watchpoints in ascending id order
    pub fn list_active(&self) -> impl Iterator<Item = &Watchpoint> {
        self.watchpoints.values()
    }

    /// Look up a watchpoint by id
    pub fn get(&self, id: u32) -> Option<&Watchpoint> {
        self.watchpoints.get(&id)
    }

    /// Check whether any watchpoint covers the node
    pub fn is_watched(&self, node_name: &str) -> bool {
        self.watchpoints.values().any(|w| w.watches(node_name))
    }

    /// Drop all watchpoints
    pub fn clear(&mut self) {
        self.watchpoints.clear();
    }

    /// Get the number of watchpoints
    pub fn len(&self) -> usize {
        self.watchpoints.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.watchpoints.is_empty()
    }
}
