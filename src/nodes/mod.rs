//! Node system - attributes, nodes, the graph and its snapshots

pub mod attribute;
pub mod graph;
pub mod hooks;
pub mod metadata;
pub mod node;
pub mod snapshot;

// Re-export core types
pub use attribute::{AttrFamily, AttrType, AttrValue, Attribute, AttributeData, ConnectionRole};
pub use graph::{Edge, Endpoint, NodeGraph, Preferences};
pub use hooks::{DefaultBehavior, NodeBehavior};
pub use metadata::{AttributeSpec, Metadata, MetadataParser};
pub use node::{sanitize_name, LineageEntry, Node, NodeId, NodeOptions, Orientation, Rgba};
pub use snapshot::{GraphSnapshot, NodeData, SceneFile, SnapshotDiff};
