//! Base node type every other type extends

use crate::constants::node::BASE_TYPE;
use crate::plugins::registrar::{NodeClass, PluginOrigin, PluginRegistrar, StaticModule, WidgetClass};

pub const MODULE: StaticModule = StaticModule {
    name: BASE_TYPE,
    origin: PluginOrigin::Core,
    register,
};

fn register(registrar: &mut PluginRegistrar) {
    registrar.register_node_type(NodeClass::new(BASE_TYPE));
    registrar.register_widget_type(WidgetClass::new(BASE_TYPE, "NodeWidget"));
}
