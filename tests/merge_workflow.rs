//! End to end: plugin discovery from a scratch root, node creation and
//! connection limits on the merge type

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use scenegraph::nodes::ConnectionRole;
use scenegraph::plugins::builtin;
use scenegraph::{
    ConnectionError, GraphEvent, NodeClass, NodeGraph, NodeOptions, PluginConfig, PluginManager, PluginOrigin,
    PluginRegistrar, StaticModule, WidgetClass,
};
use tempfile::TempDir;

const SOURCE_MTD: &str = r#"{
    "Outputs": {
        "image": {
            "type": "MERGE",
            "connectable": true,
            "connection_type": "output"
        }
    }
}"#;

fn register_source(registrar: &mut PluginRegistrar) {
    registrar.register_node_type(
        NodeClass::new("source")
            .with_parent("dagnode")
            .with_category("io")
            .with_default_name("read"),
    );
    registrar.register_widget_type(WidgetClass::new("source", "NodeWidget"));
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let path = entry.unwrap().path();
        fs::copy(&path, to.join(path.file_name().unwrap())).unwrap();
    }
}

/// A plugin root holding the shipped metadata plus an external `source` type
fn setup() -> (TempDir, PluginManager) {
    let root = tempfile::tempdir().unwrap();
    let resources = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
    copy_dir(&resources.join("metadata"), &root.path().join("metadata"));
    copy_dir(&resources.join("plugins"), &root.path().join("plugins"));

    let external = root.path().join("studio");
    fs::create_dir_all(&external).unwrap();
    fs::write(external.join("source.mtd"), SOURCE_MTD).unwrap();

    let mut modules = builtin::static_modules();
    modules.push(StaticModule {
        name: "source",
        origin: PluginOrigin::External,
        register: register_source,
    });
    let config = PluginConfig::with_root(root.path()).with_external_path(&external);
    let mut plugins = PluginManager::with_modules(config, modules);
    assert!(plugins.load_plugins().is_empty());
    (root, plugins)
}

#[test]
fn test_registry_after_discovery() {
    let (_root, plugins) = setup();

    assert_eq!(plugins.node_types(&[], false), vec!["dagnode", "merge", "source"]);
    assert_eq!(plugins.core_modules(), vec!["dagnode"]);
    assert_eq!(plugins.external_modules(), vec!["source"]);
    assert_eq!(plugins.default_name("source").unwrap(), "read");

    let lineage: Vec<&str> = plugins
        .entry("merge")
        .unwrap()
        .lineage
        .iter()
        .map(|entry| entry.type_name.as_str())
        .collect();
    assert_eq!(lineage, vec!["merge", "dagnode"]);
}

#[test]
fn test_merge_input_accepts_one_connection() {
    let (_root, plugins) = setup();
    let mut graph = NodeGraph::new();

    let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
    let first = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
    let second = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
    assert_eq!(graph.node(first).unwrap().name(), "read");
    assert_eq!(graph.node(second).unwrap().name(), "read1");

    let node = graph.node(merge).unwrap();
    assert_eq!(node.color(), [255, 136, 136, 255]);
    assert_eq!(node.attribute("inputA").unwrap().label(), "input A");
    assert_eq!(node.dag_types(), vec!["merge", "dagnode"]);

    let edge = graph.connect("read.image", "merge.inputA").unwrap();
    assert_eq!(
        graph.connect("read1.image", "merge.inputA"),
        Err(ConnectionError::CapacityExceeded {
            attribute: "inputA".into(),
            max: 1
        })
    );
    assert_eq!(graph.edges(), &[edge]);

    graph.connect("read1.image", "merge.inputB").unwrap();
    assert_eq!(graph.incoming_edges(merge).len(), 2);
}

#[test]
fn test_inputs_cannot_feed_inputs() {
    let (_root, plugins) = setup();
    let mut graph = NodeGraph::new();
    let a = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
    let b = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();

    assert_eq!(
        graph.add_edge(a, "inputA", b, "inputB"),
        Err(ConnectionError::RoleMismatch {
            attribute: "inputA".into(),
            expected: ConnectionRole::Output,
            found: "input".into(),
        })
    );
    assert!(graph.edges().is_empty());
}

#[test]
fn test_listeners_see_each_change_once() {
    let (_root, plugins) = setup();
    let mut graph = NodeGraph::new();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let listener = graph.subscribe(move |event: &GraphEvent| sink.borrow_mut().push(event.clone()));

    let source = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
    let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
    graph.add_edge(source, "image", merge, "inputA").unwrap();
    graph.remove_node(source);

    let kinds: Vec<&str> = events
        .borrow()
        .iter()
        .map(|event| match event {
            GraphEvent::NodesAdded { .. } => "nodes_added",
            GraphEvent::NodesRemoved { .. } => "nodes_removed",
            GraphEvent::EdgesAdded { .. } => "edges_added",
            GraphEvent::EdgesRemoved { .. } => "edges_removed",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["nodes_added", "nodes_added", "edges_added", "edges_removed", "nodes_removed"]
    );

    assert!(graph.unsubscribe(listener));
    graph.remove_node(merge);
    assert_eq!(events.borrow().len(), 5);
}

#[test]
fn test_snapshot_diff_and_scene_round_trip() {
    let (root, plugins) = setup();
    let mut graph = NodeGraph::new();
    let source = graph.add_node(&plugins, "source", NodeOptions::new()).unwrap();
    let before = graph.snapshot();

    let merge = graph.add_node(&plugins, "merge", NodeOptions::new()).unwrap();
    graph.add_edge(source, "image", merge, "inputB").unwrap();
    graph.set_node_attribute(source, "docstring", "plate").unwrap();

    let diff = before.diff(&graph.snapshot());
    assert_eq!(diff.added_nodes, vec![merge]);
    assert_eq!(diff.changed_nodes, vec![source]);
    assert_eq!(diff.added_edges.len(), 1);

    let path = root.path().join("shot.scene");
    graph.write(&path).unwrap();
    let mut restored = NodeGraph::new();
    restored.read(&plugins, &path).unwrap();
    assert_eq!(restored.snapshot(), graph.snapshot());
    assert_eq!(restored.node(source).unwrap().docstring(), "plate");
}
