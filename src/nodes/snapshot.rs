//! Immutable graph state for undo/redo and persistence

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use glam::Vec2;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::attribute::AttributeData;
use super::graph::{Edge, Preferences};
use super::node::{NodeId, Orientation, Rgba};

/// Serialized state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
    pub node_class: String,
    pub color: Rgba,
    #[serde(default)]
    pub docstring: String,
    pub pos: Vec2,
    pub width: f32,
    pub base_height: f32,
    #[serde(default)]
    pub force_expand: bool,
    pub enabled: bool,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeData>,
}

/// Deep copy of a graph: every node's data plus every edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// What changed going from `self` to `other`
    pub fn diff(&self, other: &GraphSnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for node in &other.nodes {
            match self.node(node.id) {
                None => diff.added_nodes.push(node.id),
                Some(before) if before != node => diff.changed_nodes.push(node.id),
                Some(_) => {}
            }
        }
        diff.removed_nodes = self
            .nodes
            .iter()
            .filter(|node| other.node(node.id).is_none())
            .map(|node| node.id)
            .collect();

        let before: BTreeSet<&Edge> = self.edges.iter().collect();
        let after: BTreeSet<&Edge> = other.edges.iter().collect();
        diff.added_edges = after.difference(&before).map(|edge| (*edge).clone()).collect();
        diff.removed_edges = before.difference(&after).map(|edge| (*edge).clone()).collect();

        diff
    }
}

/// Differences between two snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub changed_nodes: Vec<NodeId>,
    pub added_edges: Vec<Edge>,
    pub removed_edges: Vec<Edge>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// On-disk scene document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Preferences,
    pub graph: GraphSnapshot,
}
