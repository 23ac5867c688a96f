//! Immutable view of the state tree.
//!
//! A `StateNode` tree is rebuilt each time a machine commits a transition and
//! is shared with subscribers through snapshots. It is a read-only picture of
//! the declared hierarchy plus the activity flags at commit time.

use super::path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One node of the resolved state tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    /// Name as declared in its parent's `states` map.
    pub name: String,
    /// Fully-qualified dotted path from the root, e.g. `.root.idle`.
    pub path: String,
    /// Whether the node was entered when the snapshot was committed.
    pub active: bool,
    /// Whether all children are active together.
    pub parallel: bool,
    /// Name of the default child, when the node has children.
    pub initial: Option<String>,
    /// Children in declaration order.
    pub states: IndexMap<String, StateNode>,
    /// Handlers this node declares, by event name, in declaration order.
    pub on: IndexMap<String, Vec<HandlerView>>,
}

/// Read-only summary of one declared event handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerView {
    /// Resolved path of the transition target, if the handler transitions.
    pub to: Option<String>,
    /// Action names in run order; inline actions appear as `<inline>`.
    pub actions: Vec<String>,
}

impl StateNode {
    pub fn is_leaf(&self) -> bool {
        self.states.is_empty()
    }

    /// All nodes whose path ends with `pattern`, in pre-order.
    ///
    /// See [`path::find_matches`].
    pub fn find(&self, pattern: &str) -> Vec<&StateNode> {
        path::find_matches(self, pattern)
    }

    /// Paths of the active leaves below (and including) this node, in pre-order.
    pub fn active_leaves(&self) -> Vec<&str> {
        let mut leaves = Vec::new();
        self.collect_active_leaves(&mut leaves);
        leaves
    }

    fn collect_active_leaves<'a>(&'a self, acc: &mut Vec<&'a str>) {
        if !self.active {
            return;
        }
        let mut any_child = false;
        for child in self.states.values().filter(|c| c.active) {
            any_child = true;
            child.collect_active_leaves(acc);
        }
        if !any_child {
            acc.push(&self.path);
        }
    }

    /// Iterate over this node and all descendants in pre-order.
    pub fn descendants(&self) -> impl Iterator<Item = &StateNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.states.values().rev());
            Some(node)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(parent: &str, name: &str, active: bool) -> StateNode {
        StateNode {
            name: name.to_string(),
            path: format!("{parent}.{name}"),
            active,
            parallel: false,
            initial: None,
            states: IndexMap::new(),
            on: IndexMap::new(),
        }
    }

    fn tree() -> StateNode {
        let mut states = IndexMap::new();
        states.insert("idle".to_string(), leaf(".root", "idle", false));
        states.insert("running".to_string(), leaf(".root", "running", true));
        StateNode {
            name: "root".to_string(),
            path: ".root".to_string(),
            active: true,
            parallel: false,
            initial: Some("idle".to_string()),
            states,
            on: [("PING".to_string(), vec![HandlerView::default()])]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn active_leaves_skips_inactive_branches() {
        assert_eq!(tree().active_leaves(), vec![".root.running"]);
    }

    #[test]
    fn descendants_are_pre_order() {
        let root = tree();
        let paths: Vec<&str> = root.descendants().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec![".root", ".root.idle", ".root.running"]);
    }

    #[test]
    fn inactive_root_has_no_active_leaves() {
        let mut root = tree();
        root.active = false;
        assert!(root.active_leaves().is_empty());
    }

    #[test]
    fn handler_views_serialize_by_event_name() {
        let mut root = tree();
        root.on["PING"][0] = HandlerView {
            to: Some(".root.idle".to_string()),
            actions: vec!["count".to_string()],
        };

        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(
            json["on"],
            serde_json::json!({ "PING": [{ "to": ".root.idle", "actions": ["count"] }] })
        );
    }
}
