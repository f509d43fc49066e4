//! Node types and core node functionality
//!
//! A [`Node`] owns its attributes and the merged metadata of its type. Its
//! reserved properties (`name`, `pos`, `color`, ...) and its attributes share
//! one name space; [`Node::get`] and [`Node::set`] map a name onto the right
//! storage and announce changes on the owning graph's event bus.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::{AttrValue, Attribute, AttributeData};
use super::hooks::NodeBehavior;
use super::metadata::{Metadata, PropertyBag};
use super::snapshot::NodeData;
use crate::constants::node as defaults;
use crate::error::{MetadataError, NodeError};
use crate::events::{EventBus, GraphEvent};
use crate::plugins::registrar::NodeClass;

/// Unique identifier for a node
pub type NodeId = Uuid;

/// 8-bit RGBA color
pub type Rgba = [u8; 4];

/// Layout direction of a node's connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Some(Orientation::Horizontal),
            "vertical" => Some(Orientation::Vertical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }
}

/// One step of a node type's ancestry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEntry {
    pub type_name: String,
    /// Description file of this type, if it has one
    pub metadata: Option<PathBuf>,
}

/// Construction options. Anything left unset falls back to the type defaults.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub id: Option<NodeId>,
    pub name: Option<String>,
    pub color: Option<Rgba>,
    pub docstring: Option<String>,
    pub pos: Option<Vec2>,
    pub width: Option<f32>,
    pub base_height: Option<f32>,
    pub force_expand: Option<bool>,
    pub enabled: Option<bool>,
    pub orientation: Option<Orientation>,
    /// Full attribute state, replacing what metadata declares
    pub attributes: IndexMap<String, AttributeData>,
    /// Initial attribute values
    pub values: IndexMap<String, AttrValue>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_pos(mut self, pos: Vec2) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Options recreating the node described by `data`
    pub fn from_data(data: &NodeData) -> Self {
        Self {
            id: Some(data.id),
            name: Some(data.name.clone()),
            color: Some(data.color),
            docstring: Some(data.docstring.clone()),
            pos: Some(data.pos),
            width: Some(data.width),
            base_height: Some(data.base_height),
            force_expand: Some(data.force_expand),
            enabled: Some(data.enabled),
            orientation: Some(data.orientation),
            attributes: data.attributes.clone(),
            values: IndexMap::new(),
        }
    }
}

/// Core node structure
pub struct Node {
    id: NodeId,
    name: String,
    node_type: String,
    node_class: String,
    color: Rgba,
    docstring: String,
    pos: Vec2,
    width: f32,
    base_height: f32,
    force_expand: bool,
    enabled: bool,
    orientation: Orientation,
    attributes: IndexMap<String, Attribute>,
    metadata: Metadata,
    /// Most derived type first
    lineage: Vec<LineageEntry>,
    behavior: Arc<dyn NodeBehavior>,
    bus: Option<EventBus>,
}

impl Node {
    /// Creates a node, reading the description files along `lineage`.
    ///
    /// `lineage` lists the node's own type first and the base type last.
    pub fn new(
        class: &NodeClass,
        lineage: Vec<LineageEntry>,
        options: NodeOptions,
    ) -> Result<Self, NodeError> {
        let metadata = read_lineage(&lineage);
        Self::with_metadata(class, lineage, metadata, options)
    }

    /// Creates a node from already merged metadata
    pub fn with_metadata(
        class: &NodeClass,
        lineage: Vec<LineageEntry>,
        metadata: Metadata,
        options: NodeOptions,
    ) -> Result<Self, NodeError> {
        let mut node = Self {
            id: options.id.unwrap_or_else(Uuid::new_v4),
            name: String::new(),
            node_type: class.type_name.clone(),
            node_class: class.class_name.clone(),
            color: class.default_color,
            docstring: String::new(),
            pos: Vec2::ZERO,
            width: defaults::DEFAULT_WIDTH,
            base_height: defaults::DEFAULT_BASE_HEIGHT,
            force_expand: false,
            enabled: true,
            orientation: Orientation::default(),
            attributes: IndexMap::new(),
            metadata,
            lineage,
            behavior: class.behavior.clone(),
            bus: None,
        };

        node.apply_property_descriptors();

        node.name = normalize_name(options.name.as_deref().unwrap_or(&class.default_name));
        if let Some(color) = options.color {
            node.color = color;
        }
        if let Some(docstring) = options.docstring {
            node.docstring = docstring;
        }
        if let Some(pos) = options.pos {
            node.pos = pos;
        }
        if let Some(width) = options.width {
            node.width = width;
        }
        if let Some(base_height) = options.base_height {
            node.base_height = base_height;
        }
        if let Some(force_expand) = options.force_expand {
            node.force_expand = force_expand;
        }
        if let Some(enabled) = options.enabled {
            node.enabled = enabled;
        }
        if let Some(orientation) = options.orientation {
            node.orientation = orientation;
        }

        node.build_attributes();
        if node.attributes.is_empty() && node.requires_attributes() {
            return Err(NodeError::NoUsableAttributes(node.node_type.clone()));
        }

        if !options.attributes.is_empty() {
            let mut restored = IndexMap::new();
            for (name, data) in &options.attributes {
                if defaults::is_reserved(name) {
                    warn!("{}: ignoring attribute state for reserved name \"{}\"", node.node_type, name);
                    continue;
                }
                let attribute = match node.attributes.shift_remove(name) {
                    Some(mut attribute) => {
                        attribute.apply_data(data);
                        attribute
                    }
                    None => Attribute::from_data(name.clone(), node.id, data),
                };
                restored.insert(name.clone(), attribute);
            }
            node.attributes = restored;
        }
        for (name, value) in options.values {
            node.write_value(&name, value)?;
        }

        Ok(node)
    }

    /// Builds one attribute per metadata entry that is not a reserved
    /// property. Rejected entries are logged and returned.
    pub fn build_attributes(&mut self) -> Vec<MetadataError> {
        let (specs, errors) = self.metadata.attribute_specs();
        for error in &errors {
            warn!("{} \"{}\": {}", self.node_type, self.name, error);
        }
        for spec in specs {
            if defaults::is_reserved(&spec.name) {
                continue;
            }
            debug!("{}: building attribute \"{}\"", self.node_type, spec.name);
            let attribute = Attribute::from_spec(&spec, self.id);
            self.attributes.insert(spec.name, attribute);
        }
        errors
    }

    /// Re-reads the description files along this node's lineage, base first
    pub fn read_metadata(&self) -> Metadata {
        read_lineage(&self.lineage)
    }

    /// Entries named after reserved properties seed those properties
    fn apply_property_descriptors(&mut self) {
        let descriptors: Vec<(String, AttrValue)> = self
            .metadata
            .entries()
            .filter(|(_, name, _)| defaults::is_reserved(name))
            .filter_map(|(_, name, bag)| descriptor_default(bag).map(|value| (name.to_string(), value)))
            .collect();

        for (name, value) in descriptors {
            if let Err(e) = self.write_property(&name, value) {
                debug!("{}: skipping property descriptor \"{}\": {}", self.node_type, name, e);
            }
        }
    }

    /// True when some non-reserved metadata entry is declared required
    fn requires_attributes(&self) -> bool {
        self.metadata.entries().any(|(_, name, bag)| {
            !defaults::is_reserved(name)
                && bag.get("required").map_or(false, |value| match value {
                    serde_json::Value::Object(map) => map.get("value").and_then(|v| v.as_bool()) == Some(true),
                    other => other.as_bool() == Some(true),
                })
        })
    }

    // -- identity ------------------------------------------------------------

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn node_class(&self) -> &str {
        &self.node_class
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn docstring(&self) -> &str {
        &self.docstring
    }

    pub fn pos(&self) -> Vec2 {
        self.pos
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn base_height(&self) -> f32 {
        self.base_height
    }

    pub fn force_expand(&self) -> bool {
        self.force_expand
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn lineage(&self) -> &[LineageEntry] {
        &self.lineage
    }

    /// Type names from this node's type down to the base type
    pub fn dag_types(&self) -> Vec<&str> {
        self.lineage.iter().map(|entry| entry.type_name.as_str()).collect()
    }

    /// True while the node belongs to a graph
    pub fn in_graph(&self) -> bool {
        self.bus.is_some()
    }

    // -- geometry ------------------------------------------------------------

    /// Nodes with several connections per side draw expanded
    pub fn expanded(&self) -> bool {
        self.force_expand || self.inputs().len().max(self.outputs().len()) > 1
    }

    /// Base height times the row count, plus a header row and bottom padding
    /// when expanded
    pub fn height(&self) -> f32 {
        let mut rows = self.inputs().len().max(self.outputs().len()).max(1) as f32;
        let mut padding = 0.0;
        if rows > 1.0 || self.force_expand {
            rows += 1.0;
            padding = self.base_height / 2.0;
        }
        rows * self.base_height + padding
    }

    // -- attributes ----------------------------------------------------------

    /// Attributes in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn get_attribute(&self, name: &str) -> Result<&Attribute, NodeError> {
        self.attributes
            .get(name)
            .ok_or_else(|| NodeError::AttributeNotFound(name.to_string()))
    }

    pub fn inputs(&self) -> Vec<&Attribute> {
        self.attributes.values().filter(|a| a.is_input()).collect()
    }

    pub fn outputs(&self) -> Vec<&Attribute> {
        self.attributes.values().filter(|a| a.is_output()).collect()
    }

    /// Adds a user attribute
    pub fn add_attribute(&mut self, name: &str, value: AttrValue) -> Result<&Attribute, NodeError> {
        validate_attribute_name(name)?;
        if self.attributes.contains_key(name) {
            return Err(NodeError::AttributeExists(name.to_string()));
        }
        self.attributes
            .insert(name.to_string(), Attribute::new(name, self.id, value.clone()));
        self.emit(GraphEvent::AttributeUpdated {
            id: self.id,
            name: name.to_string(),
            value,
        });
        self.get_attribute(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Result<Attribute, NodeError> {
        self.attributes
            .shift_remove(name)
            .ok_or_else(|| NodeError::AttributeNotFound(name.to_string()))
    }

    /// Renames an attribute. The attribute moves to the end of the
    /// declaration order.
    pub fn rename_attribute(&mut self, name: &str, new_name: &str) -> Result<(), NodeError> {
        validate_attribute_name(new_name)?;
        if !self.attributes.contains_key(name) {
            return Err(NodeError::AttributeNotFound(name.to_string()));
        }
        if name == new_name {
            return Ok(());
        }
        if self.attributes.contains_key(new_name) {
            return Err(NodeError::AttributeExists(new_name.to_string()));
        }
        if let Some(mut attribute) = self.attributes.shift_remove(name) {
            attribute.set_name(new_name);
            self.attributes.insert(new_name.to_string(), attribute);
        }
        Ok(())
    }

    // -- property access -----------------------------------------------------

    /// Reads an attribute value or a reserved property
    pub fn get(&self, name: &str) -> Result<AttrValue, NodeError> {
        if let Some(attribute) = self.attributes.get(name) {
            return Ok(attribute.value().clone());
        }
        self.read_property(name)
            .ok_or_else(|| NodeError::AttributeNotFound(name.to_string()))
    }

    /// Writes an attribute value or a reserved property.
    ///
    /// Existing attributes and reserved properties announce an update only
    /// when the value changed. Setting `pos` or `name` always announces.
    /// Unknown names create a user attribute.
    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) -> Result<(), NodeError> {
        let value = value.into();
        if self.attributes.contains_key(name) {
            self.write_value(name, value)?;
            return Ok(());
        }
        match name {
            "pos" => {
                self.write_property(name, value)?;
                self.emit(GraphEvent::NodePositionChanged { id: self.id, pos: self.pos });
            }
            "name" => {
                self.write_property(name, value)?;
                self.emit(GraphEvent::NodeNameChanged {
                    id: self.id,
                    new_name: self.name.clone(),
                });
            }
            _ if defaults::is_reserved(name) => {
                if self.write_property(name, value)? {
                    let value = self.get(name)?;
                    self.emit(GraphEvent::AttributeUpdated {
                        id: self.id,
                        name: name.to_string(),
                        value,
                    });
                }
            }
            _ => {
                self.add_attribute(name, value)?;
            }
        }
        Ok(())
    }

    pub fn set_pos(&mut self, pos: Vec2) {
        self.pos = pos;
        self.emit(GraphEvent::NodePositionChanged { id: self.id, pos });
    }

    /// Sets the node name, normalized. Returns the stored name.
    pub fn set_name(&mut self, name: &str) -> &str {
        self.name = normalize_name(name);
        self.emit(GraphEvent::NodeNameChanged {
            id: self.id,
            new_name: self.name.clone(),
        });
        &self.name
    }

    /// Stores an attribute value, creating a user attribute when missing,
    /// and announces it if it changed
    fn write_value(&mut self, name: &str, value: AttrValue) -> Result<(), NodeError> {
        let Some(attribute) = self.attributes.get_mut(name) else {
            self.add_attribute(name, value)?;
            return Ok(());
        };
        if attribute.set_value(value)? {
            let value = attribute.value().clone();
            self.emit(GraphEvent::AttributeUpdated {
                id: self.id,
                name: name.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn read_property(&self, name: &str) -> Option<AttrValue> {
        let value = match name {
            "name" => AttrValue::String(self.name.clone()),
            "node_type" => AttrValue::String(self.node_type.clone()),
            "node_class" => AttrValue::String(self.node_class.clone()),
            "id" => AttrValue::String(self.id.to_string()),
            "color" => AttrValue::Vector(self.color.iter().map(|c| f64::from(*c)).collect()),
            "docstring" => AttrValue::String(self.docstring.clone()),
            "width" => AttrValue::Float(f64::from(self.width)),
            "base_height" => AttrValue::Float(f64::from(self.base_height)),
            "force_expand" => AttrValue::Bool(self.force_expand),
            "pos" => AttrValue::Vector(vec![f64::from(self.pos.x), f64::from(self.pos.y)]),
            "enabled" => AttrValue::Bool(self.enabled),
            "orientation" => AttrValue::String(self.orientation.as_str().to_string()),
            "graph" => AttrValue::Bool(self.in_graph()),
            "expanded" => AttrValue::Bool(self.expanded()),
            "height" => AttrValue::Float(f64::from(self.height())),
            "attributes" => AttrValue::List(self.attributes.keys().cloned().collect()),
            "metadata" => AttrValue::List(self.metadata.sections().map(str::to_string).collect()),
            _ => return None,
        };
        Some(value)
    }

    /// Writes a reserved property. Returns whether it changed.
    fn write_property(&mut self, name: &str, value: AttrValue) -> Result<bool, NodeError> {
        let invalid = |reason: &str| NodeError::InvalidValue {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let changed = match name {
            "name" => {
                let text = value.as_str().ok_or_else(|| invalid("expected a string"))?;
                replace(&mut self.name, normalize_name(text))
            }
            "docstring" => {
                let text = value.as_str().ok_or_else(|| invalid("expected a string"))?;
                replace(&mut self.docstring, text.to_string())
            }
            "color" => {
                let color = to_rgba(&value).ok_or_else(|| invalid("expected 3 or 4 components in 0..=255"))?;
                replace(&mut self.color, color)
            }
            "pos" => {
                let pos = match value.as_vector() {
                    Some([x, y]) => Vec2::new(*x as f32, *y as f32),
                    _ => return Err(invalid("expected 2 components")),
                };
                replace(&mut self.pos, pos)
            }
            "width" | "base_height" => {
                let number = value.as_f64().ok_or_else(|| invalid("expected a number"))? as f32;
                if number <= 0.0 {
                    return Err(invalid("must be positive"));
                }
                let slot = if name == "width" { &mut self.width } else { &mut self.base_height };
                replace(slot, number)
            }
            "force_expand" | "enabled" => {
                let flag = value.as_bool().ok_or_else(|| invalid("expected a boolean"))?;
                let slot = if name == "enabled" { &mut self.enabled } else { &mut self.force_expand };
                replace(slot, flag)
            }
            "orientation" => {
                let orientation = value
                    .as_str()
                    .and_then(Orientation::parse)
                    .ok_or_else(|| invalid("expected \"horizontal\" or \"vertical\""))?;
                replace(&mut self.orientation, orientation)
            }
            _ if defaults::is_reserved(name) => return Err(NodeError::ReadOnly(name.to_string())),
            _ => return Err(NodeError::AttributeNotFound(name.to_string())),
        };
        Ok(changed)
    }

    // -- behavior ------------------------------------------------------------

    pub fn evaluate(&self) -> bool {
        self.behavior.evaluate(self)
    }

    pub fn execute(&self) -> Result<Vec<AttrValue>, String> {
        self.behavior.execute(self)
    }

    /// Serializable state: reserved properties and attributes
    pub fn data(&self) -> NodeData {
        NodeData {
            id: self.id,
            name: self.name.clone(),
            node_type: self.node_type.clone(),
            node_class: self.node_class.clone(),
            color: self.color,
            docstring: self.docstring.clone(),
            pos: self.pos,
            width: self.width,
            base_height: self.base_height,
            force_expand: self.force_expand,
            enabled: self.enabled,
            orientation: self.orientation,
            attributes: self
                .attributes
                .iter()
                .map(|(name, attribute)| (name.clone(), attribute.data()))
                .collect(),
        }
    }

    // -- graph membership ----------------------------------------------------

    pub(crate) fn attach(&mut self, bus: EventBus) {
        self.bus = Some(bus);
    }

    pub(crate) fn detach(&mut self) {
        self.bus = None;
    }

    /// Sets the name without announcing it; the graph announces renames itself
    pub(crate) fn set_name_silent(&mut self, name: String) {
        self.name = name;
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(bus) = &self.bus {
            bus.emit(event);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("pos", &self.pos)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.node_type)
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid regex"));
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").expect("valid regex"));

/// Normalizes a node name: whitespace becomes `_`, other invalid characters
/// are dropped, runs of `_` collapse and leading or trailing `_` are trimmed.
/// Returns an empty string if nothing valid remains.
pub fn sanitize_name(name: &str) -> String {
    let name = WHITESPACE.replace_all(name.trim(), "_");
    let name = INVALID_CHARS.replace_all(&name, "");
    let name = UNDERSCORES.replace_all(&name, "_");
    name.trim_matches('_').to_string()
}

/// Sanitized name, or the default node name when nothing valid remains
pub(crate) fn normalize_name(name: &str) -> String {
    let name = sanitize_name(name);
    if name.is_empty() {
        defaults::DEFAULT_NAME.to_string()
    } else {
        name
    }
}

fn validate_attribute_name(name: &str) -> Result<(), NodeError> {
    if defaults::is_reserved(name) {
        return Err(NodeError::ReservedName(name.to_string()));
    }
    if name.is_empty() || name.contains('.') || name.chars().any(char::is_whitespace) {
        return Err(NodeError::InvalidValue {
            name: name.to_string(),
            reason: "attribute names must be non-empty without dots or whitespace".to_string(),
        });
    }
    Ok(())
}

fn read_lineage(lineage: &[LineageEntry]) -> Metadata {
    Metadata::from_lineage(lineage.iter().rev().filter_map(|entry| entry.metadata.as_deref()))
}

/// Default value carried by a property descriptor entry
fn descriptor_default(bag: &PropertyBag) -> Option<AttrValue> {
    let raw = match bag.get("default")? {
        serde_json::Value::Object(map) => map.get("value")?.clone(),
        other => other.clone(),
    };
    serde_json::from_value::<AttrValue>(raw)
        .ok()
        .filter(|value| !value.is_null())
}

fn to_rgba(value: &AttrValue) -> Option<Rgba> {
    let components = value.as_vector()?;
    if components.len() != 3 && components.len() != 4 {
        return None;
    }
    let mut color = [255u8; 4];
    for (slot, component) in color.iter_mut().zip(components) {
        if !(0.0..=255.0).contains(component) {
            return None;
        }
        *slot = component.round() as u8;
    }
    Some(color)
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
