//! Merge node: combines two inputs

use crate::constants::node::BASE_TYPE;
use crate::nodes::attribute::AttrValue;
use crate::nodes::hooks::NodeBehavior;
use crate::nodes::Node;
use crate::plugins::registrar::{NodeClass, PluginOrigin, PluginRegistrar, StaticModule, WidgetClass};

pub const TYPE_NAME: &str = "merge";

pub const MODULE: StaticModule = StaticModule {
    name: TYPE_NAME,
    origin: PluginOrigin::Builtin,
    register,
};

fn register(registrar: &mut PluginRegistrar) {
    registrar.register_node_type(
        NodeClass::new(TYPE_NAME)
            .with_parent(BASE_TYPE)
            .with_class_name("evaluate")
            .with_default_name("merge")
            .with_default_color([255, 136, 136, 255])
            .with_behavior(MergeBehavior),
    );
    registrar.register_widget_type(WidgetClass::new(TYPE_NAME, "NodeWidget"));
}

/// Returns both inputs as they are
pub struct MergeBehavior;

impl NodeBehavior for MergeBehavior {
    fn execute(&self, node: &Node) -> Result<Vec<AttrValue>, String> {
        ["inputA", "inputB"]
            .iter()
            .map(|name| node.get(name).map_err(|e| e.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::metadata::MetadataParser;
    use crate::nodes::node::NodeOptions;

    #[test]
    fn test_execute_returns_both_inputs() {
        let mut registrar = PluginRegistrar::new();
        register(&mut registrar);
        let (nodes, widgets) = registrar.into_parts();
        let class = nodes.into_iter().next().unwrap();
        assert_eq!(widgets.len(), 1);

        let metadata = MetadataParser::parse_str(
            r#"{"Inputs": {
                "inputA": {"type": "STRING", "connectable": true, "connection_type": "input"},
                "inputB": {"type": "STRING", "connectable": true, "connection_type": "input"}
            }}"#,
            "merge.mtd",
        )
        .unwrap();
        let node = Node::with_metadata(
            &class,
            Vec::new(),
            metadata,
            NodeOptions::new().with_value("inputA", "a").with_value("inputB", "b"),
        )
        .unwrap();

        assert_eq!(node.color(), [255, 136, 136, 255]);
        assert_eq!(node.node_class(), "evaluate");
        assert_eq!(node.execute(), Ok(vec![AttrValue::from("a"), AttrValue::from("b")]));
        assert!(node.evaluate());
    }
}
