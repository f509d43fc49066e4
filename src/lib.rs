//! Scenegraph core library
//!
//! A plugin driven node graph: node types are registered by plugin modules
//! and described by metadata files, nodes carry typed attributes, and the
//! graph validates connections and announces every change to its listeners.
//!
//! ```no_run
//! use scenegraph::{NodeGraph, NodeOptions, PluginConfig, PluginManager};
//!
//! let mut plugins = PluginManager::new(PluginConfig::from_env());
//! plugins.load_plugins();
//!
//! let mut graph = NodeGraph::new();
//! let merge = graph.add_node(&plugins, "merge", NodeOptions::new())?;
//! println!("{}", graph.node(merge).map(|node| node.name()).unwrap_or_default());
//! # Ok::<(), scenegraph::GraphError>(())
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod nodes;
pub mod plugins;

// Re-export commonly used types
pub use config::PluginConfig;
pub use error::{ConnectionError, GraphError, MetadataError, NodeError, PluginError};
pub use events::{EventBus, GraphEvent, GraphListener, ListenerId};
pub use nodes::{
    AttrType, AttrValue, Attribute, Edge, Endpoint, GraphSnapshot, Metadata, MetadataParser, Node, NodeGraph,
    NodeId, NodeOptions,
};
pub use plugins::registrar::{NodeClass, PluginOrigin, PluginRegistrar, StaticModule, WidgetClass};
pub use plugins::{PluginEntry, PluginManager};
