//! Application-wide constants and default values
//!
//! Centralized location for all hard-coded values to improve maintainability

/// Environment variable holding a colon separated list of external plugin directories
pub const EXTERNAL_PLUGINS_ENV: &str = "SCENEGRAPH_EXTERNAL_PLUGINS";

/// Environment variable overriding the installation root
pub const ROOT_ENV: &str = "SCENEGRAPH_ROOT";

/// Symbol every plugin library must export
pub const REGISTER_SYMBOL: &[u8] = b"scenegraph_register_plugin";

/// Scene file format version written by `NodeGraph::write`
pub const SCENE_FORMAT_VERSION: u32 = 1;

/// Directory layout below the installation root
pub mod paths {
    /// Core node types (and core plugin libraries)
    pub const CORE_DIR: &str = "core";

    /// Built-in plugins shipped with the application
    pub const BUILTIN_DIR: &str = "plugins";

    /// Fixed location of the core types' description files
    pub const METADATA_DIR: &str = "metadata";

    /// Extension of node description files
    pub const METADATA_EXTENSION: &str = "mtd";

    /// Name of the application data directory under the platform data dir
    pub const APP_DIR: &str = "scenegraph";
}

/// Node system constants
pub mod node {
    /// Type name of the root node type every other type extends
    pub const BASE_TYPE: &str = "dagnode";

    /// Name given to nodes whose type does not provide one
    pub const DEFAULT_NAME: &str = "node";

    /// Default node color (RGBA)
    pub const DEFAULT_COLOR: [u8; 4] = [172, 172, 172, 255];

    /// Default node width
    pub const DEFAULT_WIDTH: f32 = 100.0;

    /// Default height of a single node row
    pub const DEFAULT_BASE_HEIGHT: f32 = 15.0;

    /// Default incoming connection limit of an input attribute
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

    /// Node properties that can never be used as attribute names
    pub const RESERVED_PROPERTIES: &[&str] = &[
        "name",
        "node_type",
        "node_class",
        "id",
        "color",
        "docstring",
        "width",
        "base_height",
        "force_expand",
        "pos",
        "enabled",
        "orientation",
        "graph",
        "expanded",
        "height",
        "attributes",
        "metadata",
    ];

    /// Returns true if `name` is one of the node's own properties
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_PROPERTIES.contains(&name)
    }
}

/// Well-known metadata section names
pub mod sections {
    /// Section holding the node transform descriptors
    pub const TRANSFORM: &str = "Node Transform";

    /// Section holding the default node attributes
    pub const ATTRIBUTES: &str = "Node Attributes";
}
