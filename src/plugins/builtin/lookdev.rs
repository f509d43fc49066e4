//! Look development widget. It ships without a node type, so the `lookdev`
//! entry stays incomplete until a module registers one.

use crate::plugins::registrar::{PluginOrigin, PluginRegistrar, StaticModule, WidgetClass};

pub const MODULE: StaticModule = StaticModule {
    name: "lookdev",
    origin: PluginOrigin::Builtin,
    register,
};

fn register(registrar: &mut PluginRegistrar) {
    registrar.register_widget_type(WidgetClass::new("lookdev", "LookdevWidget").with_node_class("container"));
}
