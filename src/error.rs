//! Error types for every layer of the node graph core

use std::path::PathBuf;

use thiserror::Error;

use crate::nodes::attribute::{AttrType, ConnectionRole};
use crate::nodes::NodeId;

/// Failures while locating, reading or validating description files.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("malformed metadata file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
    #[error("invalid attribute \"{section}.{attribute}\": {reason}")]
    InvalidAttribute {
        section: String,
        attribute: String,
        reason: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of node attribute and property accessors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("no attribute exists \"{0}\"")]
    AttributeNotFound(String),
    #[error("attribute \"{0}\" already exists")]
    AttributeExists(String),
    #[error("\"{0}\" is a reserved node property")]
    ReservedName(String),
    #[error("property \"{0}\" is read-only")]
    ReadOnly(String),
    #[error("attribute \"{name}\" expects a {expected} value")]
    TypeMismatch { name: String, expected: AttrType },
    #[error("invalid value for \"{name}\": {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("node type \"{0}\" has no usable attributes but requires at least one")]
    NoUsableAttributes(String),
}

/// Failures of the plugin registry.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin \"{0}\" is not loaded or is disabled")]
    UnknownPlugin(String),
    #[error("failed to load plugin library: {0}")]
    Libloading(#[from] libloading::Error),
    #[error("plugin library {} does not export a registration entry point", .0.display())]
    MissingEntryPoint(PathBuf),
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Reasons an edge was refused. The graph is left untouched in every case.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("node {node} has no attribute \"{attribute}\"")]
    AttributeNotFound { node: NodeId, attribute: String },
    #[error("\"{attribute}\" is not an {expected} connection (found {found})")]
    RoleMismatch {
        attribute: String,
        expected: ConnectionRole,
        found: String,
    },
    #[error("\"{attribute}\" already has {max} incoming connection(s)")]
    CapacityExceeded { attribute: String, max: usize },
    #[error("cannot connect a node to itself")]
    SelfConnection,
    #[error("edge already exists")]
    Duplicate,
    #[error("invalid connection path \"{0}\", expected \"node.attribute\"")]
    InvalidPath(String),
}

/// Failures of graph level operations.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("a node with id {0} already exists")]
    DuplicateId(NodeId),
    #[error("unsupported scene format version {0}")]
    UnsupportedVersion(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
