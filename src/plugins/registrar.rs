//! Registration protocol between plugin modules and the [`PluginManager`]
//!
//! Every plugin module, statically linked or loaded from a shared library,
//! exposes a single entry point that receives a [`PluginRegistrar`] and
//! registers node and widget classes on it. Shared libraries export it with
//! [`declare_plugin!`](crate::declare_plugin).
//!
//! [`PluginManager`]: super::PluginManager

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::node as defaults;
use crate::nodes::hooks::{DefaultBehavior, NodeBehavior};
use crate::nodes::node::Rgba;

/// Where a plugin module was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginOrigin {
    Core,
    Builtin,
    External,
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOrigin::Core => f.write_str("core"),
            PluginOrigin::Builtin => f.write_str("builtin"),
            PluginOrigin::External => f.write_str("external"),
        }
    }
}

/// A node type as registered by a plugin
#[derive(Clone)]
pub struct NodeClass {
    pub type_name: String,
    /// Type this one extends; `None` only for the base type
    pub parent: Option<String>,
    pub class_name: String,
    pub category: Option<String>,
    pub default_name: String,
    pub default_color: Rgba,
    pub behavior: Arc<dyn NodeBehavior>,
}

impl NodeClass {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            parent: None,
            class_name: defaults::BASE_TYPE.to_string(),
            category: None,
            default_name: defaults::DEFAULT_NAME.to_string(),
            default_color: defaults::DEFAULT_COLOR,
            behavior: Arc::new(DefaultBehavior),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    pub fn with_default_color(mut self, color: Rgba) -> Self {
        self.default_color = color;
        self
    }

    pub fn with_behavior(mut self, behavior: impl NodeBehavior + 'static) -> Self {
        self.behavior = Arc::new(behavior);
        self
    }
}

impl fmt::Debug for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClass")
            .field("type_name", &self.type_name)
            .field("parent", &self.parent)
            .field("class_name", &self.class_name)
            .field("category", &self.category)
            .field("default_name", &self.default_name)
            .finish()
    }
}

/// The widget a front end uses to draw nodes of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetClass {
    /// Node type this widget draws
    pub widget_type: String,
    pub class_name: String,
    pub node_class: String,
}

impl WidgetClass {
    pub fn new(widget_type: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            widget_type: widget_type.into(),
            class_name: class_name.into(),
            node_class: defaults::BASE_TYPE.to_string(),
        }
    }

    pub fn with_node_class(mut self, node_class: impl Into<String>) -> Self {
        self.node_class = node_class.into();
        self
    }
}

/// Collects the classes one plugin module registers
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    nodes: Vec<NodeClass>,
    widgets: Vec<WidgetClass>,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node_type(&mut self, class: NodeClass) {
        self.nodes.push(class);
    }

    pub fn register_widget_type(&mut self, widget: WidgetClass) {
        self.widgets.push(widget);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.widgets.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<NodeClass>, Vec<WidgetClass>) {
        (self.nodes, self.widgets)
    }
}

/// Entry point of a statically linked plugin module
pub type RegisterFn = fn(&mut PluginRegistrar);

/// Entry point exported by a plugin library
#[allow(improper_ctypes_definitions)]
pub type RegisterSymbol = unsafe extern "C" fn(&mut PluginRegistrar);

/// A plugin module compiled into the application
#[derive(Debug, Clone, Copy)]
pub struct StaticModule {
    /// Module name; its description file is `<name>.mtd`
    pub name: &'static str,
    pub origin: PluginOrigin,
    pub register: RegisterFn,
}

/// Exports `$register` as the entry point of a plugin library
///
/// ```ignore
/// fn register(registrar: &mut PluginRegistrar) {
///     registrar.register_node_type(NodeClass::new("blur").with_parent("dagnode"));
/// }
///
/// scenegraph::declare_plugin!(register);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($register:path) => {
        #[allow(improper_ctypes_definitions)]
        #[no_mangle]
        pub extern "C" fn scenegraph_register_plugin(
            registrar: &mut $crate::plugins::registrar::PluginRegistrar,
        ) {
            $register(registrar)
        }
    };
}
