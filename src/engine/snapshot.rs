//! Immutable views published after each committed event.

use crate::core::path::{find_matches, matches_path};
use crate::core::StateNode;
use crate::effects::ValueFn;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one machine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A committed view of a machine: data, active leaves and the state tree.
///
/// Every field is shared behind an `Arc`, so cloning is cheap. A new
/// snapshot gets fresh `active` and `state_tree` allocations, so observers
/// can detect change with [`Arc::ptr_eq`] even if the data is unchanged.
#[derive(Serialize)]
#[serde(bound(serialize = "D: Serialize"))]
pub struct Snapshot<D> {
    machine: MachineId,
    revision: u64,
    event: Option<String>,
    data: Arc<D>,
    active: Arc<[String]>,
    state_tree: Arc<StateNode>,
    committed_at: DateTime<Utc>,
    #[serde(skip)]
    values: Arc<IndexMap<String, ValueFn<D>>>,
}

impl<D> Clone for Snapshot<D> {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine,
            revision: self.revision,
            event: self.event.clone(),
            data: Arc::clone(&self.data),
            active: Arc::clone(&self.active),
            state_tree: Arc::clone(&self.state_tree),
            committed_at: self.committed_at,
            values: Arc::clone(&self.values),
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for Snapshot<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("machine", &self.machine)
            .field("revision", &self.revision)
            .field("event", &self.event)
            .field("data", &self.data)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<D> Snapshot<D> {
    pub(crate) fn new(
        machine: MachineId,
        revision: u64,
        event: Option<String>,
        data: Arc<D>,
        active: Vec<String>,
        state_tree: StateNode,
        values: Arc<IndexMap<String, ValueFn<D>>>,
    ) -> Self {
        Self {
            machine,
            revision,
            event,
            data,
            active: Arc::from(active),
            state_tree: Arc::new(state_tree),
            committed_at: Utc::now(),
            values,
        }
    }

    pub fn machine(&self) -> MachineId {
        self.machine
    }

    /// Number of events committed before this snapshot. Zero for the initial one.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Name of the event that produced this snapshot.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn data(&self) -> &Arc<D> {
        &self.data
    }

    /// Paths of the active leaves, in pre-order.
    pub fn active(&self) -> &Arc<[String]> {
        &self.active
    }

    pub fn state_tree(&self) -> &Arc<StateNode> {
        &self.state_tree
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }

    /// Whether any active state's path ends with `pattern`.
    ///
    /// Ancestors of active leaves count as active.
    pub fn is_in(&self, pattern: &str) -> bool {
        self.state_tree
            .descendants()
            .any(|node| node.active && matches_path(&node.path, pattern))
    }

    /// Nodes whose path ends with `pattern`, active or not.
    pub fn find(&self, pattern: &str) -> Vec<&StateNode> {
        find_matches(&self.state_tree, pattern)
    }

    /// Compute a derived value from this snapshot's data.
    ///
    /// Values are recomputed on every call.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.get(name).map(|f| f(&self.data))
    }

    /// Compute every derived value, in declaration order.
    pub fn values(&self) -> IndexMap<String, Value> {
        self.values
            .iter()
            .map(|(name, f)| (name.clone(), f(&self.data)))
            .collect()
    }
}
