//! Per-execution dependency registry.
//!
//! Holds the maps the hooks communicate through: task key -> [`FieldTask`], and node name
//! -> the node's path sequence. All are filled by a discovery pass before any field
//! executes; afterwards hooks only read the maps and mutate task state.
//!
//! A node's path sequence lists, for each publishing field, the field's ancestors from the
//! outermost inwards followed by the field itself. Ancestors are *gates*: their tasks only
//! tell whether the publishing field can still produce anything, they contribute no value.
//!
//! Uses `RwLock` for interior mutability so a registry can be shared as a
//! [`RegistryHandle`] and still accept registrations (`&self` instead of `&mut self`).

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::{TaskError, TaskFailure};
use crate::task::{FieldTask, TaskState};
use crate::types::{FieldPath, NodeName};

/// Shared handle to one execution's registry.
pub type RegistryHandle = Arc<DependencyRegistry>;

/// Node name -> contributing task keys, in discovery order.
pub type NodeTable = HashMap<NodeName, Vec<FieldPath>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SequenceEntry {
    key: FieldPath,
    publishes: bool,
}

/// One task of a node's path sequence.
#[derive(Debug, Clone)]
pub struct NodeStep {
    pub task: Arc<FieldTask>,
    /// `false` for an ancestor gate.
    pub publishes: bool,
}

/// Task and node maps for one query execution.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    tasks: RwLock<HashMap<FieldPath, Arc<FieldTask>>>,
    nodes: RwLock<HashMap<NodeName, Vec<SequenceEntry>>>,
    /// List field key -> aggregate task keys it closes.
    closers: RwLock<HashMap<FieldPath, Vec<FieldPath>>>,
    consumed: RwLock<BTreeSet<NodeName>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` as a contributor to `node`.
    ///
    /// Registering a second task at an existing key keeps the first one, so that
    /// consumers which already hold it keep observing the same state. The key is still
    /// appended to the node's contributor list once per node.
    pub fn publish(&self, node: NodeName, task: FieldTask) -> Arc<FieldTask> {
        #[cfg(feature = "tracing")]
        debug!(
            node = %node,
            task = %task.key(),
            aggregate = task.is_aggregate(),
            "registering node contributor"
        );

        self.append(node, task, true)
    }

    /// Register `task` as a gate of `node`: an ancestor of one of its publishing fields.
    ///
    /// Gates are appended to the node's path sequence in call order, so callers register
    /// a publishing field's ancestors from the outermost inwards before publishing it.
    pub fn guard(&self, node: NodeName, task: FieldTask) -> Arc<FieldTask> {
        #[cfg(feature = "tracing")]
        debug!(node = %node, task = %task.key(), "registering node gate");

        self.append(node, task, false)
    }

    fn append(&self, node: NodeName, task: FieldTask, publishes: bool) -> Arc<FieldTask> {
        let key = task.key().clone();
        let (task, inserted) = match self.tasks.write().entry(key.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => (Arc::clone(entry.insert(Arc::new(task))), true),
        };
        if let (true, Some(closer)) = (inserted, task.closed_by()) {
            self.closers
                .write()
                .entry(closer.clone())
                .or_default()
                .push(key.clone());
        }

        let mut nodes = self.nodes.write();
        let sequence = nodes.entry(node).or_default();
        match sequence.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.publishes |= publishes,
            None => sequence.push(SequenceEntry { key, publishes }),
        }
        task
    }

    /// Record that some field of the query consumes `node`.
    pub fn mark_consumed(&self, node: NodeName) {
        self.consumed.write().insert(node);
    }

    /// Task for a concrete field path, looked up by its task key.
    pub fn task_for(&self, path: &FieldPath) -> Option<Arc<FieldTask>> {
        self.task(&path.task_key())
    }

    /// Task registered at exactly `key`.
    pub fn task(&self, key: &FieldPath) -> Option<Arc<FieldTask>> {
        self.tasks.read().get(key).cloned()
    }

    /// Contributing tasks of `node`, in discovery order.
    ///
    /// `None` if no field publishes the node.
    pub fn tasks_for_node(&self, node: &NodeName) -> Option<Vec<Arc<FieldTask>>> {
        let steps = self.sequence_for_node(node)?;
        Some(
            steps
                .into_iter()
                .filter(|step| step.publishes)
                .map(|step| step.task)
                .collect(),
        )
    }

    /// The node's path sequence: gates and publishing tasks, outer to inner.
    pub fn sequence_for_node(&self, node: &NodeName) -> Option<Vec<NodeStep>> {
        let nodes = self.nodes.read();
        let sequence = nodes.get(node)?;
        let tasks = self.tasks.read();
        Some(
            sequence
                .iter()
                .filter_map(|entry| {
                    tasks.get(&entry.key).map(|task| NodeStep {
                        task: Arc::clone(task),
                        publishes: entry.publishes,
                    })
                })
                .collect(),
        )
    }

    /// Aggregate tasks closed by the completion of the list field at `key`.
    pub fn tasks_closed_by(&self, key: &FieldPath) -> Vec<Arc<FieldTask>> {
        let closers = self.closers.read();
        let Some(keys) = closers.get(key) else {
            return Vec::new();
        };
        let tasks = self.tasks.read();
        keys.iter().filter_map(|key| tasks.get(key).cloned()).collect()
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.read().is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Publishing task keys of every node.
    pub fn node_table(&self) -> NodeTable {
        self.nodes
            .read()
            .iter()
            .map(|(node, sequence)| {
                let keys = sequence
                    .iter()
                    .filter(|entry| entry.publishes)
                    .map(|entry| entry.key.clone())
                    .collect();
                (node.clone(), keys)
            })
            .collect()
    }

    /// Published nodes that no field consumes.
    pub fn unused_nodes(&self) -> Vec<NodeName> {
        let consumed = self.consumed.read();
        let mut unused: Vec<_> = self
            .nodes
            .read()
            .keys()
            .filter(|node| !consumed.contains(*node))
            .cloned()
            .collect();
        unused.sort();
        unused
    }

    /// Every failed task with its failure, sorted by task key.
    pub fn failures(&self) -> Vec<(FieldPath, TaskFailure)> {
        let mut failures: Vec<_> = self
            .tasks
            .read()
            .values()
            .filter_map(|task| match task.state() {
                TaskState::Failed(failure) => Some((task.key().clone(), failure)),
                _ => None,
            })
            .collect();
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        failures
    }

    /// Errors reported after their task had already been fulfilled.
    pub fn late_errors(&self) -> Vec<(FieldPath, TaskError)> {
        let mut late: Vec<_> = self
            .tasks
            .read()
            .values()
            .flat_map(|task| {
                let key = task.key().clone();
                task.late_errors()
                    .into_iter()
                    .map(move |error| (key.clone(), error))
            })
            .collect();
        late.sort_by(|a, b| a.0.cmp(&b.0));
        late
    }
}
