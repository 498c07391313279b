//! Nested bridge groups, flattened once into dotted names.
//!
//! ```text
//! Combat ─┬─ Attack   → "Combat.Attack"
//!         └─ Block    → "Combat.Block"
//! Chat               → "Chat"
//! ```

use crate::domain::config::BridgeConfig;
use std::collections::BTreeMap;

/// Separator between group and bridge names.
pub const TREE_SEPARATOR: char = '.';

#[derive(Debug, Clone)]
enum TreeNode {
    Bridge(BridgeConfig),
    Group(BridgeTree),
}

/// A tree of bridge definitions.
#[derive(Debug, Clone, Default)]
pub struct BridgeTree {
    entries: BTreeMap<String, TreeNode>,
}

impl BridgeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf bridge.
    #[must_use]
    pub fn bridge(mut self, name: impl Into<String>, config: BridgeConfig) -> Self {
        self.entries.insert(name.into(), TreeNode::Bridge(config));
        self
    }

    /// Add a nested group.
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, subtree: BridgeTree) -> Self {
        self.entries.insert(name.into(), TreeNode::Group(subtree));
        self
    }

    /// Fully-qualified names with their configs, in name order.
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, BridgeConfig)> {
        let mut out = Vec::new();
        self.walk("", &mut out);
        out
    }

    fn walk(&self, prefix: &str, out: &mut Vec<(String, BridgeConfig)>) {
        for (name, node) in &self.entries {
            let qualified = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}{TREE_SEPARATOR}{name}")
            };
            match node {
                TreeNode::Bridge(config) => out.push((qualified, config.clone())),
                TreeNode::Group(subtree) => subtree.walk(&qualified, out),
            }
        }
    }
}
