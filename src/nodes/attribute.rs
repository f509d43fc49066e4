//! Typed attribute values and the attribute slots nodes own

use std::fmt;

use serde::{Deserialize, Serialize};

use super::metadata::AttributeSpec;
use super::node::NodeId;
use crate::constants;
use crate::error::NodeError;

/// Declared type of an attribute, as spelled in description files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttrType {
    Float,
    Int,
    Bool,
    String,
    Float2,
    Float3,
    Int2,
    Int3,
    Color,
    File,
    Dir,
    Multi,
    Merge,
    Node,
}

/// Broad family an attribute type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrFamily {
    Scalar,
    Vector,
    Color,
    DataReference,
}

impl AttrType {
    /// Parse a type name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name.trim().to_ascii_uppercase().as_str() {
            "FLOAT" => AttrType::Float,
            "INT" => AttrType::Int,
            "BOOL" => AttrType::Bool,
            "STRING" => AttrType::String,
            "FLOAT2" => AttrType::Float2,
            "FLOAT3" => AttrType::Float3,
            "INT2" => AttrType::Int2,
            "INT3" => AttrType::Int3,
            "COLOR" => AttrType::Color,
            "FILE" => AttrType::File,
            "DIR" => AttrType::Dir,
            "MULTI" => AttrType::Multi,
            "MERGE" => AttrType::Merge,
            "NODE" => AttrType::Node,
            _ => return None,
        };
        Some(ty)
    }

    /// Get the canonical name for this type
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::Float => "FLOAT",
            AttrType::Int => "INT",
            AttrType::Bool => "BOOL",
            AttrType::String => "STRING",
            AttrType::Float2 => "FLOAT2",
            AttrType::Float3 => "FLOAT3",
            AttrType::Int2 => "INT2",
            AttrType::Int3 => "INT3",
            AttrType::Color => "COLOR",
            AttrType::File => "FILE",
            AttrType::Dir => "DIR",
            AttrType::Multi => "MULTI",
            AttrType::Merge => "MERGE",
            AttrType::Node => "NODE",
        }
    }

    pub fn family(&self) -> AttrFamily {
        match self {
            AttrType::Float | AttrType::Int | AttrType::Bool | AttrType::String => AttrFamily::Scalar,
            AttrType::Float2 | AttrType::Float3 | AttrType::Int2 | AttrType::Int3 => AttrFamily::Vector,
            AttrType::Color => AttrFamily::Color,
            AttrType::File | AttrType::Dir | AttrType::Multi | AttrType::Merge | AttrType::Node => {
                AttrFamily::DataReference
            }
        }
    }

    /// Component count for vector types
    fn arity(&self) -> Option<usize> {
        match self {
            AttrType::Float2 | AttrType::Int2 => Some(2),
            AttrType::Float3 | AttrType::Int3 => Some(3),
            AttrType::Color => Some(4),
            _ => None,
        }
    }

    fn is_integral(&self) -> bool {
        matches!(self, AttrType::Int | AttrType::Int2 | AttrType::Int3)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored in an attribute.
///
/// The representation is untyped on purpose so that it maps directly onto the
/// JSON found in description and scene files; the owning [`Attribute`] carries
/// the declared [`AttrType`] and [`AttrValue::coerce`] enforces it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Vector(Vec<f64>),
    List(Vec<String>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Best guess at a type for values that arrive without a declaration
    pub fn infer_type(&self) -> Option<AttrType> {
        match self {
            AttrValue::Null => None,
            AttrValue::Bool(_) => Some(AttrType::Bool),
            AttrValue::Int(_) => Some(AttrType::Int),
            AttrValue::Float(_) => Some(AttrType::Float),
            AttrValue::String(_) => Some(AttrType::String),
            AttrValue::Vector(v) => match v.len() {
                2 => Some(AttrType::Float2),
                3 => Some(AttrType::Float3),
                4 => Some(AttrType::Color),
                _ => None,
            },
            AttrValue::List(_) => Some(AttrType::Multi),
        }
    }

    /// Convert this value to the representation required by `ty`.
    ///
    /// `Null` is accepted for every type. Integers widen to floats, colors
    /// given as RGB gain an opaque alpha, and single strings become one element
    /// lists for multi-value types.
    pub fn coerce(self, ty: AttrType) -> Result<AttrValue, String> {
        if self.is_null() {
            return Ok(self);
        }
        let mismatch = |value: &AttrValue| format!("expected {}, got {}", ty, value.describe());

        match ty {
            AttrType::Float => match self {
                AttrValue::Float(_) => Ok(self),
                AttrValue::Int(v) => Ok(AttrValue::Float(v as f64)),
                other => Err(mismatch(&other)),
            },
            AttrType::Int => match self {
                AttrValue::Int(_) => Ok(self),
                AttrValue::Float(v) if v.fract() == 0.0 => Ok(AttrValue::Int(v as i64)),
                other => Err(mismatch(&other)),
            },
            AttrType::Bool => match self {
                AttrValue::Bool(_) => Ok(self),
                other => Err(mismatch(&other)),
            },
            AttrType::String | AttrType::File | AttrType::Dir | AttrType::Node => match self {
                AttrValue::String(_) => Ok(self),
                other => Err(mismatch(&other)),
            },
            AttrType::Multi | AttrType::Merge => match self {
                AttrValue::List(_) => Ok(self),
                AttrValue::String(s) if s.is_empty() => Ok(AttrValue::List(Vec::new())),
                AttrValue::String(s) => Ok(AttrValue::List(vec![s])),
                AttrValue::Vector(v) if v.is_empty() => Ok(AttrValue::List(Vec::new())),
                other => Err(mismatch(&other)),
            },
            AttrType::Float2 | AttrType::Float3 | AttrType::Int2 | AttrType::Int3 | AttrType::Color => {
                let mut components = match self {
                    AttrValue::Vector(v) => v,
                    other => return Err(mismatch(&other)),
                };
                if ty == AttrType::Color && components.len() == 3 {
                    components.push(255.0);
                }
                let arity = ty.arity().unwrap_or_default();
                if components.len() != arity {
                    return Err(format!(
                        "expected {} with {} components, got {}",
                        ty,
                        arity,
                        components.len()
                    ));
                }
                if ty.is_integral() && components.iter().any(|c| c.fract() != 0.0) {
                    return Err(format!("expected integer components for {}", ty));
                }
                Ok(AttrValue::Vector(components))
            }
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::String(_) => "string",
            AttrValue::Vector(_) => "vector",
            AttrValue::List(_) => "list",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Bool(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::String(v) => write!(f, "{:?}", v),
            AttrValue::Vector(v) => write!(f, "{:?}", v),
            AttrValue::List(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

/// Direction of a connectable attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Input,
    Output,
}

impl ConnectionRole {
    /// Parse a role name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "input" => Some(ConnectionRole::Input),
            "output" => Some(ConnectionRole::Output),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Input => f.write_str("input"),
            ConnectionRole::Output => f.write_str("output"),
        }
    }
}

/// Serializable form of an attribute, used in snapshots and scene files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeData {
    pub value: AttrValue,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attr_type: Option<AttrType>,
    #[serde(default)]
    pub connectable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// A named, typed value slot on a node, optionally a connection point
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    node: NodeId,
    value: AttrValue,
    attr_type: Option<AttrType>,
    role: Option<ConnectionRole>,
    max_connections: Option<usize>,
    required: bool,
    private: bool,
    user: bool,
    label: Option<String>,
    description: Option<String>,
}

impl Attribute {
    /// Creates a user attribute holding `value`, its type inferred from the value
    pub fn new(name: impl Into<String>, node: NodeId, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            node,
            attr_type: value.infer_type(),
            value,
            role: None,
            max_connections: None,
            required: false,
            private: false,
            user: true,
            label: None,
            description: None,
        }
    }

    /// Creates an attribute from a validated metadata entry
    pub fn from_spec(spec: &AttributeSpec, node: NodeId) -> Self {
        let (role, max_connections) = match &spec.connection {
            Some(connection) => (Some(connection.role), connection.max_connections),
            None => (None, None),
        };
        Self {
            name: spec.name.clone(),
            node,
            value: spec.default.clone(),
            attr_type: spec.attr_type(),
            role,
            max_connections,
            required: spec.required,
            private: spec.private,
            user: false,
            label: spec.label.clone(),
            description: spec.description.clone(),
        }
    }

    /// Rebuilds an attribute from its serialized form
    pub fn from_data(name: impl Into<String>, node: NodeId, data: &AttributeData) -> Self {
        let mut attribute = Self::new(name, node, AttrValue::Null);
        attribute.apply_data(data);
        attribute
    }

    /// Overwrites every field with the serialized form
    pub fn apply_data(&mut self, data: &AttributeData) {
        self.attr_type = data.attr_type.or_else(|| data.value.infer_type());
        // serialized lists lose their element type when empty
        self.value = match self.attr_type {
            Some(ty) => data.value.clone().coerce(ty).unwrap_or_else(|_| data.value.clone()),
            None => data.value.clone(),
        };
        self.role = if data.connectable { data.connection_type } else { None };
        self.max_connections = data.max_connections;
        self.required = data.required;
        self.private = data.private;
        self.user = data.user;
        self.label = data.label.clone();
        self.description = data.desc.clone();
    }

    pub fn data(&self) -> AttributeData {
        AttributeData {
            value: self.value.clone(),
            attr_type: self.attr_type,
            connectable: self.is_connectable(),
            connection_type: self.role,
            max_connections: self.max_connections,
            required: self.required,
            private: self.private,
            user: self.user,
            label: self.label.clone(),
            desc: self.description.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Id of the node that owns this attribute
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn value(&self) -> &AttrValue {
        &self.value
    }

    /// Stores `value` after coercing it to the declared type.
    ///
    /// Returns whether the stored value changed.
    pub fn set_value(&mut self, value: AttrValue) -> Result<bool, NodeError> {
        let value = match self.attr_type {
            Some(ty) => value.coerce(ty).map_err(|_| NodeError::TypeMismatch {
                name: self.name.clone(),
                expected: ty,
            })?,
            None => value,
        };
        if value == self.value {
            return Ok(false);
        }
        if self.attr_type.is_none() {
            self.attr_type = value.infer_type();
        }
        self.value = value;
        Ok(true)
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        self.attr_type
    }

    pub fn role(&self) -> Option<ConnectionRole> {
        self.role
    }

    pub fn is_connectable(&self) -> bool {
        self.role.is_some()
    }

    pub fn is_input(&self) -> bool {
        self.role == Some(ConnectionRole::Input)
    }

    pub fn is_output(&self) -> bool {
        self.role == Some(ConnectionRole::Output)
    }

    /// Incoming connection limit. Only enforced on inputs; `None` means unbounded.
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// True for attributes added at runtime rather than declared in metadata
    pub fn is_user(&self) -> bool {
        self.user
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Display label: the declared label, or a role based default.
    /// Required attributes are prefixed with `*`.
    pub fn label(&self) -> String {
        let base = match (&self.label, self.role) {
            (Some(label), _) => label.clone(),
            (None, Some(ConnectionRole::Input)) => "Input".to_string(),
            (None, Some(ConnectionRole::Output)) => "Output".to_string(),
            (None, None) => "Attribute".to_string(),
        };
        if self.required {
            format!("*{}", base)
        } else {
            base
        }
    }
}

/// Default incoming limit for an input declared without `max_connections`
pub(crate) fn default_max_connections(role: ConnectionRole) -> Option<usize> {
    match role {
        ConnectionRole::Input => Some(constants::node::DEFAULT_MAX_CONNECTIONS),
        ConnectionRole::Output => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_type_names_parse_case_insensitively() {
        assert_eq!(AttrType::parse("float3"), Some(AttrType::Float3));
        assert_eq!(AttrType::parse("MERGE"), Some(AttrType::Merge));
        assert_eq!(AttrType::parse("matrix"), None);
        assert_eq!(AttrType::File.family(), AttrFamily::DataReference);
        assert_eq!(AttrType::Int2.family(), AttrFamily::Vector);
    }

    #[test]
    fn test_coerce_widens_and_checks_shape() {
        assert_eq!(AttrValue::Int(2).coerce(AttrType::Float), Ok(AttrValue::Float(2.0)));
        assert_eq!(
            AttrValue::Vector(vec![10.0, 20.0, 30.0]).coerce(AttrType::Color),
            Ok(AttrValue::Vector(vec![10.0, 20.0, 30.0, 255.0]))
        );
        assert!(AttrValue::Vector(vec![1.0]).coerce(AttrType::Float2).is_err());
        assert!(AttrValue::Vector(vec![1.5, 2.0]).coerce(AttrType::Int2).is_err());
        assert!(AttrValue::Bool(true).coerce(AttrType::String).is_err());
        assert_eq!(
            AttrValue::from("a.exr").coerce(AttrType::Multi),
            Ok(AttrValue::List(vec!["a.exr".to_string()]))
        );
        assert_eq!(AttrValue::Null.coerce(AttrType::Int), Ok(AttrValue::Null));
    }

    #[test]
    fn test_untagged_json_shape() {
        let value: AttrValue = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(value, AttrValue::Vector(vec![1.0, 2.0, 3.0]));
        let value: AttrValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(value, AttrValue::List(vec!["a".into(), "b".into()]));
        let value: AttrValue = serde_json::from_str("null").unwrap();
        assert!(value.is_null());
        let value: AttrValue = serde_json::from_str("7").unwrap();
        assert_eq!(value, AttrValue::Int(7));
    }

    #[test]
    fn test_set_value_reports_changes_and_enforces_type() {
        let mut attribute = Attribute::new("gain", Uuid::new_v4(), AttrValue::Float(1.0));
        assert_eq!(attribute.set_value(AttrValue::Float(1.0)), Ok(false));
        assert_eq!(attribute.set_value(AttrValue::Int(3)), Ok(true));
        assert_eq!(attribute.value(), &AttrValue::Float(3.0));
        assert!(matches!(
            attribute.set_value(AttrValue::from("loud")),
            Err(NodeError::TypeMismatch { .. })
        ));
        assert_eq!(attribute.value(), &AttrValue::Float(3.0));
    }

    #[test]
    fn test_labels_follow_role_and_required() {
        let node = Uuid::new_v4();
        let mut attribute = Attribute::new("in", node, AttrValue::Null);
        assert_eq!(attribute.label(), "Attribute");
        attribute.apply_data(&AttributeData {
            value: AttrValue::Null,
            attr_type: None,
            connectable: true,
            connection_type: Some(ConnectionRole::Input),
            max_connections: Some(1),
            required: true,
            private: false,
            user: false,
            label: None,
            desc: None,
        });
        assert_eq!(attribute.label(), "*Input");
        assert!(attribute.is_input());
        assert_eq!(Attribute::from_data("in", node, &attribute.data()), attribute);
    }
}
