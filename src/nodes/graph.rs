//! Node graph data structures and operations
//!
//! The graph owns its nodes and edges and is the only way to mutate them once
//! a node is added. Every mutation either applies completely or returns an
//! error with the graph unchanged, and every applied mutation is announced on
//! the graph's [`EventBus`].

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::Utc;
use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attribute::{AttrValue, Attribute, ConnectionRole};
use super::node::{normalize_name, Node, NodeId, NodeOptions};
use super::snapshot::{GraphSnapshot, SceneFile};
use crate::constants::SCENE_FORMAT_VERSION;
use crate::error::{ConnectionError, GraphError, NodeError};
use crate::events::{EventBus, GraphEvent, GraphListener, ListenerId};
use crate::plugins::PluginManager;

/// Scene level settings saved alongside the graph
pub type Preferences = serde_json::Map<String, Value>;

/// One end of an edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub attribute: String,
}

impl Endpoint {
    pub fn new(node: NodeId, attribute: impl Into<String>) -> Self {
        Self {
            node,
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

/// A connection from an output attribute to an input attribute
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: Endpoint,
    pub target: Endpoint,
}

impl Edge {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self { source, target }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.target.node == node
    }

    fn touches_attribute(&self, node: NodeId, attribute: &str) -> bool {
        (self.source.node == node && self.source.attribute == attribute)
            || (self.target.node == node && self.target.attribute == attribute)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A graph containing nodes and their connections
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
    preferences: Preferences,
    bus: EventBus,
}

impl NodeGraph {
    /// Creates a new empty node graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, listener: impl GraphListener + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    // -- nodes ---------------------------------------------------------------

    /// Creates a node of a registered, enabled type and adds it
    pub fn add_node(
        &mut self,
        plugins: &PluginManager,
        node_type: &str,
        options: NodeOptions,
    ) -> Result<NodeId, GraphError> {
        let node = plugins.instantiate(node_type, options)?;
        self.insert_node(node)
    }

    /// Adds an already built node, renaming it if its name is taken
    pub fn insert_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        let name = self.unique_name(node.name(), None);
        node.set_name_silent(name);
        node.attach(self.bus.clone());
        debug!("adding node {} ({})", node, id);
        self.nodes.insert(id, node);
        self.bus.emit(GraphEvent::NodesAdded { ids: vec![id] });
        Ok(id)
    }

    /// Removes a node and every edge touching it. Returns false if the node
    /// does not exist.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(mut node) = self.nodes.shift_remove(&id) else {
            return false;
        };
        node.detach();
        let removed = self.take_edges(|edge| edge.touches(id));
        if !removed.is_empty() {
            self.bus.emit(GraphEvent::EdgesRemoved { edges: removed });
        }
        self.bus.emit(GraphEvent::NodesRemoved { ids: vec![id] });
        true
    }

    /// Renames a node, normalizing the name and keeping it unique. Returns the
    /// name actually stored.
    pub fn rename_node(&mut self, id: NodeId, name: &str) -> Result<String, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let name = self.unique_name(&normalize_name(name), Some(id));
        let node = self.node_entry(id)?;
        Ok(node.set_name(&name).to_string())
    }

    /// Sets an attribute value or reserved property of a node
    pub fn set_node_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        if name == "name" {
            let text = value.as_str().ok_or_else(|| NodeError::InvalidValue {
                name: name.to_string(),
                reason: "expected a string".to_string(),
            })?;
            self.rename_node(id, text)?;
            return Ok(());
        }
        self.node_entry(id)?.set(name, value)?;
        Ok(())
    }

    pub fn set_node_position(&mut self, id: NodeId, pos: Vec2) -> Result<(), GraphError> {
        self.node_entry(id)?.set_pos(pos);
        Ok(())
    }

    /// Removes an attribute and the edges attached to it
    pub fn remove_node_attribute(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        self.node_entry(id)?.remove_attribute(name)?;
        let removed = self.take_edges(|edge| edge.touches_attribute(id, name));
        if !removed.is_empty() {
            self.bus.emit(GraphEvent::EdgesRemoved { edges: removed });
        }
        Ok(())
    }

    /// Renames an attribute, moving its edges along
    pub fn rename_node_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        new_name: &str,
    ) -> Result<(), GraphError> {
        self.node_entry(id)?.rename_attribute(name, new_name)?;
        if name == new_name {
            return Ok(());
        }
        let removed = self.take_edges(|edge| edge.touches_attribute(id, name));
        if removed.is_empty() {
            return Ok(());
        }
        let added: Vec<Edge> = removed
            .iter()
            .cloned()
            .map(|mut edge| {
                for end in [&mut edge.source, &mut edge.target] {
                    if end.node == id && end.attribute == name {
                        end.attribute = new_name.to_string();
                    }
                }
                edge
            })
            .collect();
        self.edges.extend(added.iter().cloned());
        self.bus.emit(GraphEvent::EdgesRemoved { edges: removed });
        self.bus.emit(GraphEvent::EdgesAdded { edges: added });
        Ok(())
    }

    fn node_entry(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// `base` if free, otherwise `base` with the lowest free numeric suffix
    fn unique_name(&self, base: &str, exclude: Option<NodeId>) -> String {
        let taken = |candidate: &str| {
            self.nodes
                .values()
                .any(|node| Some(node.id()) != exclude && node.name() == candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        let stem = base.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { base } else { stem };
        (1..)
            .map(|index| format!("{}{}", stem, index))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // -- edges ---------------------------------------------------------------

    /// Connects an output attribute to an input attribute
    pub fn add_edge(
        &mut self,
        source_node: NodeId,
        source_attr: &str,
        target_node: NodeId,
        target_attr: &str,
    ) -> Result<Edge, ConnectionError> {
        let edge = Edge::new(
            Endpoint::new(source_node, source_attr),
            Endpoint::new(target_node, target_attr),
        );
        check_edge(&self.nodes, &self.edges, &edge)?;

        debug!("connecting {} -> {}", source_attr, target_attr);
        self.edges.push(edge.clone());
        self.bus.emit(GraphEvent::EdgesAdded {
            edges: vec![edge.clone()],
        });
        Ok(edge)
    }

    /// Connects two `node.attribute` paths addressed by node name
    pub fn connect(&mut self, source: &str, target: &str) -> Result<Edge, ConnectionError> {
        let (source_node, source_attr) = self.resolve_path(source)?;
        let (target_node, target_attr) = self.resolve_path(target)?;
        self.add_edge(source_node, &source_attr, target_node, &target_attr)
    }

    fn resolve_path(&self, path: &str) -> Result<(NodeId, String), ConnectionError> {
        let (name, attribute) = path
            .split_once('.')
            .filter(|(name, attribute)| !name.is_empty() && !attribute.is_empty())
            .ok_or_else(|| ConnectionError::InvalidPath(path.to_string()))?;
        let node = self
            .find_node_by_name(name)
            .ok_or_else(|| ConnectionError::InvalidPath(path.to_string()))?;
        Ok((node.id(), attribute.to_string()))
    }

    /// Removes one edge. Returns false if it does not exist.
    pub fn remove_edge(&mut self, source: &Endpoint, target: &Endpoint) -> bool {
        let removed = self.take_edges(|edge| &edge.source == source && &edge.target == target);
        if removed.is_empty() {
            return false;
        }
        self.bus.emit(GraphEvent::EdgesRemoved { edges: removed });
        true
    }

    fn take_edges(&mut self, matches: impl Fn(&Edge) -> bool) -> Vec<Edge> {
        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|edge| matches(edge));
        self.edges = kept;
        removed
    }

    // -- queries -------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.name() == name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn incoming_edges(&self, id: NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| edge.target.node == id).collect()
    }

    pub fn outgoing_edges(&self, id: NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| edge.source.node == id).collect()
    }

    /// Nodes sharing an edge with `id`, upstream first
    pub fn connected_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = Vec::new();
        let upstream = self.incoming_edges(id).into_iter().map(|edge| edge.source.node);
        let downstream = self.outgoing_edges(id).into_iter().map(|edge| edge.target.node);
        for node in upstream.chain(downstream) {
            if !result.contains(&node) {
                result.push(node);
            }
        }
        result
    }

    // -- snapshots and persistence -------------------------------------------

    /// Deep copy of the current state
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().map(Node::data).collect(),
            edges: self.edges.clone(),
        }
    }

    /// Replaces the whole graph with `snapshot`. Nothing changes if any node
    /// or edge of the snapshot cannot be rebuilt.
    pub fn restore(&mut self, plugins: &PluginManager, snapshot: &GraphSnapshot) -> Result<(), GraphError> {
        let mut nodes = IndexMap::new();
        for data in &snapshot.nodes {
            if nodes.contains_key(&data.id) {
                return Err(GraphError::DuplicateId(data.id));
            }
            let node = plugins.instantiate(&data.node_type, NodeOptions::from_data(data))?;
            nodes.insert(data.id, node);
        }
        let mut edges: Vec<Edge> = Vec::with_capacity(snapshot.edges.len());
        for edge in &snapshot.edges {
            check_edge(&nodes, &edges, edge)?;
            edges.push(edge.clone());
        }

        for node in self.nodes.values_mut() {
            node.detach();
        }
        for node in nodes.values_mut() {
            node.attach(self.bus.clone());
        }
        self.nodes = nodes;
        self.edges = edges;
        self.bus.emit(GraphEvent::GraphUpdated);
        Ok(())
    }

    /// Removes every node, edge and preference
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.detach();
        }
        self.nodes.clear();
        self.edges.clear();
        self.preferences.clear();
        self.bus.emit(GraphEvent::GraphUpdated);
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn update_preferences(&mut self, preferences: Preferences) {
        self.preferences.extend(preferences);
    }

    /// Writes the graph and preferences to a scene file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let path = path.as_ref();
        self.bus.emit(GraphEvent::GraphAboutToBeSaved);
        let scene = SceneFile {
            version: SCENE_FORMAT_VERSION,
            saved_at: Utc::now(),
            preferences: self.preferences.clone(),
            graph: self.snapshot(),
        };
        fs::write(path, serde_json::to_string_pretty(&scene)?)?;
        info!("saved scene {} ({} nodes)", path.display(), self.nodes.len());
        Ok(())
    }

    /// Replaces the graph with the contents of a scene file
    pub fn read(&mut self, plugins: &PluginManager, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let path = path.as_ref();
        let scene: SceneFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if scene.version > SCENE_FORMAT_VERSION {
            return Err(GraphError::UnsupportedVersion(scene.version));
        }
        self.restore(plugins, &scene.graph)?;
        self.preferences = scene.preferences.clone();
        info!("read scene {} ({} nodes)", path.display(), self.nodes.len());
        self.bus.emit(GraphEvent::GraphRead {
            preferences: scene.preferences,
        });
        Ok(())
    }
}

/// Validates `edge` against `nodes` and the edges already in place
fn check_edge(nodes: &IndexMap<NodeId, Node>, edges: &[Edge], edge: &Edge) -> Result<(), ConnectionError> {
    let Edge { source, target } = edge;
    let source_node = nodes
        .get(&source.node)
        .ok_or(ConnectionError::NodeNotFound(source.node))?;
    let target_node = nodes
        .get(&target.node)
        .ok_or(ConnectionError::NodeNotFound(target.node))?;
    if source.node == target.node {
        return Err(ConnectionError::SelfConnection);
    }

    let output = endpoint_attribute(source_node, source)?;
    let input = endpoint_attribute(target_node, target)?;

    if !output.is_output() {
        return Err(role_mismatch(&source.attribute, ConnectionRole::Output, output.role()));
    }
    if !input.is_input() {
        return Err(role_mismatch(&target.attribute, ConnectionRole::Input, input.role()));
    }
    if edges.contains(edge) {
        return Err(ConnectionError::Duplicate);
    }
    if let Some(max) = input.max_connections() {
        let incoming = edges.iter().filter(|e| e.target == *target).count();
        if incoming >= max {
            return Err(ConnectionError::CapacityExceeded {
                attribute: target.attribute.clone(),
                max,
            });
        }
    }
    Ok(())
}

fn endpoint_attribute<'a>(node: &'a Node, end: &Endpoint) -> Result<&'a Attribute, ConnectionError> {
    node.attribute(&end.attribute)
        .ok_or_else(|| ConnectionError::AttributeNotFound {
            node: end.node,
            attribute: end.attribute.clone(),
        })
}

fn role_mismatch(attribute: &str, expected: ConnectionRole, found: Option<ConnectionRole>) -> ConnectionError {
    ConnectionError::RoleMismatch {
        attribute: attribute.to_string(),
        expected,
        found: found.map_or_else(|| "none".to_string(), |role| role.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::error::PluginError;
    use crate::plugins::builtin;
    use crate::plugins::registrar::{NodeClass, PluginOrigin, PluginRegistrar, StaticModule, WidgetClass};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn register_source(registrar: &mut PluginRegistrar) {
        registrar.register_node_type(NodeClass::new("source").with_parent("dagnode"));
        registrar.register_widget_type(WidgetClass::new("source", "NodeWidget"));
    }

    /// Shipped resources plus a `source` type with one output
    fn plugins() -> (tempfile::TempDir, PluginManager) {
        let resources = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
        let external = tempfile::tempdir().unwrap();
        fs::write(
            external.path().join("source.mtd"),
            r#"{"Outputs": {"out": {"type": "MERGE", "connectable": true, "connection_type": "output"}}}"#,
        )
        .unwrap();

        let mut modules = builtin::static_modules();
        modules.push(StaticModule {
            name: "source",
            origin: PluginOrigin::External,
            register: register_source,
        });
        let config = PluginConfig::with_root(resources).with_external_path(external.path());
        let mut plugins = PluginManager::with_modules(config, modules);
        assert!(plugins.load_plugins().is_empty());
        (external, plugins)
    }

    fn record(graph: &NodeGraph) -> Rc<RefCell<Vec<GraphEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        graph.subscribe(move |event: &GraphEvent| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[test]
    fn test_add_node_uniquifies_names() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let seen = record(&graph);

        let a = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        let b = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        assert_eq!(graph.node(a).unwrap().name(), "merge");
        assert_eq!(graph.node(b).unwrap().name(), "merge1");
        assert_eq!(
            *seen.borrow(),
            vec![GraphEvent::NodesAdded { ids: vec![a] }, GraphEvent::NodesAdded { ids: vec![b] }]
        );

        assert_eq!(graph.rename_node(b, "merge").unwrap(), "merge1");
        assert_eq!(graph.rename_node(b, "final comp").unwrap(), "final_comp");
    }

    #[test]
    fn test_add_node_rejects_unknown_and_disabled_types() {
        let (_dir, mut plugins) = plugins();
        let mut graph = NodeGraph::new();
        assert!(matches!(
            graph.add_node(&plugins, "nope", NodeOptions::new()),
            Err(GraphError::Plugin(PluginError::UnknownPlugin(_)))
        ));
        plugins.enable("merge", false).unwrap();
        assert!(matches!(
            graph.add_node(&plugins, "merge", NodeOptions::new()),
            Err(GraphError::Plugin(PluginError::UnknownPlugin(_)))
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_edge_validation_leaves_graph_unchanged() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let src = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let other = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();

        let edge = graph.add_edge(src, "out", merge, "inputA").unwrap();
        let before = graph.edges().to_vec();

        let missing = NodeId::new_v4();
        assert_eq!(
            graph.add_edge(missing, "out", merge, "inputB"),
            Err(ConnectionError::NodeNotFound(missing))
        );
        assert_eq!(graph.add_edge(merge, "inputA", merge, "inputB"), Err(ConnectionError::SelfConnection));
        assert!(matches!(
            graph.add_edge(src, "nope", merge, "inputB"),
            Err(ConnectionError::AttributeNotFound { .. })
        ));
        assert!(matches!(
            graph.add_edge(merge, "inputA", src, "out"),
            Err(ConnectionError::RoleMismatch { expected: ConnectionRole::Output, .. })
        ));
        assert!(matches!(
            graph.add_edge(src, "out", other, "out"),
            Err(ConnectionError::RoleMismatch { expected: ConnectionRole::Input, .. })
        ));
        assert_eq!(graph.add_edge(src, "out", merge, "inputA"), Err(ConnectionError::Duplicate));
        assert_eq!(
            graph.add_edge(other, "out", merge, "inputA"),
            Err(ConnectionError::CapacityExceeded {
                attribute: "inputA".into(),
                max: 1
            })
        );
        assert_eq!(graph.edges(), before.as_slice());

        // outputs fan out freely
        graph.add_edge(src, "out", merge, "inputB").unwrap();
        assert_eq!(graph.outgoing_edges(src).len(), 2);
        assert_eq!(graph.connected_nodes(merge), vec![src]);

        assert!(graph.remove_edge(&edge.source, &edge.target));
        assert!(!graph.remove_edge(&edge.source, &edge.target));
    }

    #[test]
    fn test_connect_by_path() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        graph.add_node(&plugins, "source", NodeOptions::new().with_name("plate")).unwrap();
        graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();

        let edge = graph.connect("plate.out", "merge.inputB").unwrap();
        assert_eq!(edge.target.attribute, "inputB");
        assert!(matches!(graph.connect("plate", "merge.inputA"), Err(ConnectionError::InvalidPath(_))));
        assert!(matches!(graph.connect("ghost.out", "merge.inputA"), Err(ConnectionError::InvalidPath(_))));
    }

    #[test]
    fn test_remove_node_drops_edges_first() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let src = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        let edge = graph.add_edge(src, "out", merge, "inputA").unwrap();
        let seen = record(&graph);

        assert!(graph.remove_node(src));
        assert!(!graph.remove_node(src));
        assert!(graph.edges().is_empty());
        assert_eq!(
            *seen.borrow(),
            vec![
                GraphEvent::EdgesRemoved { edges: vec![edge] },
                GraphEvent::NodesRemoved { ids: vec![src] },
            ]
        );
    }

    #[test]
    fn test_attribute_changes_keep_edges_consistent() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let src = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        graph.add_edge(src, "out", merge, "inputA").unwrap();

        graph.rename_node_attribute(merge, "inputA", "front").unwrap();
        assert_eq!(graph.edges()[0].target.attribute, "front");

        graph.remove_node_attribute(merge, "front").unwrap();
        assert!(graph.edges().is_empty());
        assert!(matches!(
            graph.remove_node_attribute(merge, "front"),
            Err(GraphError::Node(NodeError::AttributeNotFound(_)))
        ));
    }

    #[test]
    fn test_attribute_update_events() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        let seen = record(&graph);

        graph.set_node_attribute(merge, "inputA", "plate.exr").unwrap();
        graph.set_node_attribute(merge, "inputA", "plate.exr").unwrap();
        graph.set_node_position(merge, Vec2::new(10.0, 20.0)).unwrap();

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(
            seen.borrow()[1],
            GraphEvent::NodePositionChanged {
                id: merge,
                pos: Vec2::new(10.0, 20.0)
            }
        );
    }

    #[test]
    fn test_snapshots_are_deep_copies() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let src = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();

        let before = graph.snapshot();
        assert_eq!(before, graph.snapshot());

        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        graph.add_edge(src, "out", merge, "inputA").unwrap();
        let after = graph.snapshot();

        let diff = before.diff(&after);
        assert_eq!(diff.added_nodes, vec![merge]);
        assert!(diff.removed_nodes.is_empty());
        assert!(diff.changed_nodes.is_empty());
        assert_eq!(diff.added_edges.len(), 1);
        assert_eq!(before.nodes.len(), 1);

        graph.restore(&plugins, &before).unwrap();
        assert_eq!(graph.snapshot(), before);
        graph.restore(&plugins, &after).unwrap();
        assert_eq!(graph.snapshot(), after);
    }

    #[test]
    fn test_failed_restore_changes_nothing() {
        let (_dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        let current = graph.snapshot();

        let mut broken = current.clone();
        broken.nodes[0].node_type = "nope".into();
        assert!(graph.restore(&plugins, &broken).is_err());
        assert_eq!(graph.snapshot(), current);
    }

    #[test]
    fn test_restore_enforces_connection_rules() {
        let (dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let a = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let b = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        graph.add_edge(a, "out", merge, "inputB").unwrap();
        let current = graph.snapshot();
        let edge = |src: NodeId, src_attr: &str, dst: NodeId, dst_attr: &str| {
            Edge::new(Endpoint::new(src, src_attr), Endpoint::new(dst, dst_attr))
        };

        let mut reversed = current.clone();
        reversed.edges.push(edge(merge, "inputA", a, "out"));
        assert!(matches!(
            graph.restore(&plugins, &reversed),
            Err(GraphError::Connection(ConnectionError::RoleMismatch {
                expected: ConnectionRole::Output,
                ..
            }))
        ));

        let mut crowded = current.clone();
        crowded.edges.push(edge(b, "out", merge, "inputB"));
        assert!(matches!(
            graph.restore(&plugins, &crowded),
            Err(GraphError::Connection(ConnectionError::CapacityExceeded { max: 1, .. }))
        ));

        let mut doubled = current.clone();
        doubled.edges.push(current.edges[0].clone());
        assert!(matches!(
            graph.restore(&plugins, &doubled),
            Err(GraphError::Connection(ConnectionError::Duplicate))
        ));
        assert_eq!(graph.snapshot(), current);

        // the same rules apply to scene files
        let path = dir.path().join("crowded.json");
        let scene = SceneFile {
            version: SCENE_FORMAT_VERSION,
            saved_at: Utc::now(),
            preferences: Preferences::new(),
            graph: crowded,
        };
        fs::write(&path, serde_json::to_string(&scene).unwrap()).unwrap();
        let mut loaded = NodeGraph::new();
        assert!(loaded.read(&plugins, &path).is_err());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_write_and_read_scene() {
        let (dir, plugins) = plugins();
        let mut graph = NodeGraph::new();
        let src = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
        let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
        graph.add_edge(src, "out", merge, "inputB").unwrap();
        let mut preferences = Preferences::new();
        preferences.insert("zoom".into(), serde_json::json!(1.5));
        graph.update_preferences(preferences.clone());

        let path = dir.path().join("comp.json");
        let seen = record(&graph);
        graph.write(&path).unwrap();
        assert_eq!(seen.borrow()[0], GraphEvent::GraphAboutToBeSaved);

        let mut loaded = NodeGraph::new();
        let events = record(&loaded);
        loaded.read(&plugins, &path).unwrap();
        assert_eq!(loaded.snapshot(), graph.snapshot());
        assert_eq!(loaded.preferences(), &preferences);
        assert_eq!(
            events.borrow().last(),
            Some(&GraphEvent::GraphRead { preferences })
        );

        loaded.reset();
        assert!(loaded.is_empty());
        assert!(loaded.edges().is_empty());
    }
}
