//! Node description files
//!
//! A description file (`<type>.mtd`) is a JSON document of the form
//! `section -> attribute -> property bag`. Files along a node type's ancestry
//! are merged base first, so a derived type updates individual properties of
//! an inherited attribute without replacing the rest.
//!
//! Raw property bags are kept as read. [`AttributeSpec`] is the validated form
//! node construction works from.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attribute::{default_max_connections, AttrFamily, AttrType, AttrValue, ConnectionRole};
use crate::constants::sections;
use crate::error::MetadataError;

/// Properties of one attribute, in declaration order
pub type PropertyBag = serde_json::Map<String, Value>;

/// Ordered `section -> attribute -> properties` mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    sections: IndexMap<String, IndexMap<String, PropertyBag>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Overlays `other` onto this metadata.
    ///
    /// New sections and attributes are appended; for an attribute present in
    /// both, each property of `other` replaces the property of the same name.
    pub fn merge(&mut self, other: &Metadata) {
        for (section, attributes) in &other.sections {
            let target = self.sections.entry(section.clone()).or_default();
            for (attribute, properties) in attributes {
                let bag = target.entry(attribute.clone()).or_default();
                for (key, value) in properties {
                    bag.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Merges a chain of files ordered base first. Files that are missing or
    /// malformed are logged and skipped.
    pub fn from_lineage<'a, I>(paths: I) -> Metadata
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut merged = Metadata::new();
        for path in paths {
            match MetadataParser::parse(path) {
                Ok(metadata) => merged.merge(&metadata),
                Err(e) => warn!("skipping metadata {}: {}", path.display(), e),
            }
        }
        merged
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Attribute names declared in `section`
    pub fn attributes(&self, section: &str) -> Vec<&str> {
        self.sections
            .get(section)
            .map(|attrs| attrs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn properties(&self, section: &str, attribute: &str) -> Option<&PropertyBag> {
        self.sections.get(section)?.get(attribute)
    }

    pub fn property(&self, section: &str, attribute: &str, property: &str) -> Option<&Value> {
        self.properties(section, attribute)?.get(property)
    }

    /// Every `(section, attribute, properties)` triple in declaration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &PropertyBag)> {
        self.sections.iter().flat_map(|(section, attrs)| {
            attrs
                .iter()
                .map(move |(name, bag)| (section.as_str(), name.as_str(), bag))
        })
    }

    /// Finds the first section declaring `attribute`
    pub fn find(&self, attribute: &str) -> Option<(&str, &PropertyBag)> {
        self.sections
            .iter()
            .find_map(|(section, attrs)| attrs.get(attribute).map(|bag| (section.as_str(), bag)))
    }

    /// Default node attributes section
    pub fn defaults(&self) -> Option<&IndexMap<String, PropertyBag>> {
        self.sections.get(sections::ATTRIBUTES)
    }

    /// Node transform section
    pub fn transform_attrs(&self) -> Option<&IndexMap<String, PropertyBag>> {
        self.sections.get(sections::TRANSFORM)
    }

    /// Validates every entry. Invalid entries come back as errors alongside
    /// the valid specs rather than aborting the whole pass.
    pub fn attribute_specs(&self) -> (Vec<AttributeSpec>, Vec<MetadataError>) {
        let mut specs = Vec::new();
        let mut errors = Vec::new();
        for (section, name, bag) in self.entries() {
            match AttributeSpec::from_properties(section, name, bag) {
                Ok(spec) => specs.push(spec),
                Err(e) => errors.push(e),
            }
        }
        (specs, errors)
    }

    pub fn input_connections(&self) -> Vec<AttributeSpec> {
        self.connections(ConnectionRole::Input)
    }

    pub fn output_connections(&self) -> Vec<AttributeSpec> {
        self.connections(ConnectionRole::Output)
    }

    fn connections(&self, role: ConnectionRole) -> Vec<AttributeSpec> {
        self.attribute_specs()
            .0
            .into_iter()
            .filter(|spec| spec.role() == Some(role))
            .collect()
    }
}

/// Reader for description files
pub struct MetadataParser;

impl MetadataParser {
    /// Reads and parses a description file
    pub fn parse(path: impl AsRef<Path>) -> Result<Metadata, MetadataError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MetadataError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let metadata = Self::parse_str(&text, path)?;
        debug!(
            "parsed {} ({} sections)",
            path.display(),
            metadata.sections.len()
        );
        Ok(metadata)
    }

    /// Parses description text. `origin` is only used in error messages.
    pub fn parse_str(text: &str, origin: impl AsRef<Path>) -> Result<Metadata, MetadataError> {
        let origin = origin.as_ref();
        let format_error = |reason: String| MetadataError::Format {
            path: origin.to_path_buf(),
            reason,
        };

        let root: Value = serde_json::from_str(text).map_err(|e| format_error(e.to_string()))?;
        let Value::Object(root) = root else {
            return Err(format_error("top level must be an object of sections".into()));
        };

        let mut metadata = Metadata::new();
        for (section, attributes) in root {
            let Value::Object(attributes) = attributes else {
                return Err(format_error(format!("section \"{}\" must be an object", section)));
            };
            let mut entries = IndexMap::new();
            for (attribute, properties) in attributes {
                let Value::Object(properties) = properties else {
                    return Err(format_error(format!(
                        "attribute \"{}.{}\" must be an object",
                        section, attribute
                    )));
                };
                entries.insert(attribute, properties);
            }
            metadata.sections.insert(section, entries);
        }
        Ok(metadata)
    }
}

/// Shape of an attribute's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// No declared type; inferred from the value at runtime
    Untyped,
    Scalar(AttrType),
    Vector(AttrType),
    Color,
    DataReference(AttrType),
}

impl AttrKind {
    pub fn from_type(ty: AttrType) -> Self {
        match ty.family() {
            AttrFamily::Scalar => AttrKind::Scalar(ty),
            AttrFamily::Vector => AttrKind::Vector(ty),
            AttrFamily::Color => AttrKind::Color,
            AttrFamily::DataReference => AttrKind::DataReference(ty),
        }
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        match self {
            AttrKind::Untyped => None,
            AttrKind::Scalar(ty) | AttrKind::Vector(ty) | AttrKind::DataReference(ty) => Some(*ty),
            AttrKind::Color => Some(AttrType::Color),
        }
    }
}

/// Connection point declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub role: ConnectionRole,
    /// Incoming limit; `None` is unbounded
    pub max_connections: Option<usize>,
}

/// A validated metadata entry
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: String,
    pub section: String,
    pub kind: AttrKind,
    pub default: AttrValue,
    pub label: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub private: bool,
    pub connection: Option<ConnectionSpec>,
    /// Properties with no built-in meaning
    pub extra: PropertyBag,
}

impl AttributeSpec {
    /// Validates one property bag
    pub fn from_properties(
        section: &str,
        name: &str,
        properties: &PropertyBag,
    ) -> Result<Self, MetadataError> {
        let invalid = |reason: String| MetadataError::InvalidAttribute {
            section: section.to_string(),
            attribute: name.to_string(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("attribute name is empty".into()));
        }

        let mut declared_type = None;
        let mut default = AttrValue::Null;
        let mut label = None;
        let mut description = None;
        let mut required = false;
        let mut private = false;
        let mut connectable = false;
        let mut role = None;
        let mut max_connections = None;
        let mut extra = PropertyBag::new();

        for (key, value) in properties {
            match key.as_str() {
                "type" => declared_type = Some(parse_type(value).map_err(&invalid)?),
                // a top level `type` wins over the one nested in `default`
                "default" => {
                    let (ty, value) = parse_default(value).map_err(&invalid)?;
                    if declared_type.is_none() {
                        declared_type = ty;
                    }
                    default = value;
                }
                "label" => label = Some(string_property(key, value).map_err(&invalid)?),
                "desc" => description = Some(string_property(key, value).map_err(&invalid)?),
                "required" => required = bool_property(key, value).map_err(&invalid)?,
                "private" => private = bool_property(key, value).map_err(&invalid)?,
                "connectable" => connectable = bool_property(key, value).map_err(&invalid)?,
                "connection_type" => {
                    let text = string_property(key, value).map_err(&invalid)?;
                    role = Some(
                        ConnectionRole::parse(&text)
                            .ok_or_else(|| invalid(format!("unknown connection type \"{}\"", text)))?,
                    );
                }
                "max_connections" => {
                    let count = unwrap_value(value)
                        .as_u64()
                        .filter(|count| *count >= 1)
                        .ok_or_else(|| invalid("max_connections must be a positive integer".into()))?;
                    max_connections = Some(count as usize);
                }
                _ => {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }

        let kind = declared_type.map(AttrKind::from_type).unwrap_or(AttrKind::Untyped);
        if let Some(ty) = kind.attr_type() {
            default = default.coerce(ty).map_err(|reason| invalid(format!("bad default: {}", reason)))?;
        }

        let connection = match (connectable, role) {
            (true, Some(role)) => Some(ConnectionSpec {
                role,
                max_connections: max_connections.or_else(|| default_max_connections(role)),
            }),
            (true, None) => return Err(invalid("connectable attribute has no connection_type".into())),
            (false, _) => None,
        };

        Ok(Self {
            name: name.to_string(),
            section: section.to_string(),
            kind,
            default,
            label,
            description,
            required,
            private,
            connection,
            extra,
        })
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        self.kind.attr_type()
    }

    pub fn role(&self) -> Option<ConnectionRole> {
        self.connection.map(|c| c.role)
    }
}

/// Unwraps the `{"value": v}` form some properties use
fn unwrap_value(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.contains_key("value") => &map["value"],
        other => other,
    }
}

fn parse_type(value: &Value) -> Result<AttrType, String> {
    let name = value
        .as_str()
        .ok_or_else(|| "type must be a string".to_string())?;
    AttrType::parse(name).ok_or_else(|| format!("unknown attribute type \"{}\"", name))
}

fn parse_default(value: &Value) -> Result<(Option<AttrType>, AttrValue), String> {
    let (ty, raw) = match value {
        Value::Object(map) => {
            let ty = match map.get("type") {
                Some(ty) => Some(parse_type(ty)?),
                None => None,
            };
            (ty, map.get("value").cloned().unwrap_or(Value::Null))
        }
        other => (None, other.clone()),
    };
    let value = serde_json::from_value::<AttrValue>(raw)
        .map_err(|_| "default value is not a supported value".to_string())?;
    Ok((ty, value))
}

fn string_property(key: &str, value: &Value) -> Result<String, String> {
    unwrap_value(value)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{} must be a string", key))
}

fn bool_property(key: &str, value: &Value) -> Result<bool, String> {
    unwrap_value(value)
        .as_bool()
        .ok_or_else(|| format!("{} must be a boolean", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> PropertyBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_parse_keeps_declaration_order() {
        let text = r#"{
            "Node Transform": {"width": {"default": {"type": "FLOAT", "value": 100}}},
            "Inputs": {
                "zeta": {"type": "FLOAT"},
                "alpha": {"type": "INT"}
            }
        }"#;
        let metadata = MetadataParser::parse_str(text, "test.mtd").unwrap();
        assert_eq!(metadata.sections().collect::<Vec<_>>(), vec!["Node Transform", "Inputs"]);
        assert_eq!(metadata.attributes("Inputs"), vec!["zeta", "alpha"]);
        assert!(metadata.transform_attrs().is_some());
        assert!(metadata.defaults().is_none());
    }

    #[test]
    fn test_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mtd");
        assert!(matches!(MetadataParser::parse(&missing), Err(MetadataError::NotFound(_))));

        assert!(matches!(
            MetadataParser::parse_str("{not json", "bad.mtd"),
            Err(MetadataError::Format { .. })
        ));
        assert!(matches!(
            MetadataParser::parse_str(r#"{"Inputs": {"a": 3}}"#, "bad.mtd"),
            Err(MetadataError::Format { .. })
        ));
        assert!(matches!(
            MetadataParser::parse_str("[]", "bad.mtd"),
            Err(MetadataError::Format { .. })
        ));
    }

    #[test]
    fn test_merge_updates_properties() {
        let mut base = MetadataParser::parse_str(
            r#"{"Inputs": {"gain": {"type": "FLOAT", "label": "Gain", "default": 1.0}}}"#,
            "base.mtd",
        )
        .unwrap();
        let original = base.clone();
        let leaf = MetadataParser::parse_str(
            r#"{"Inputs": {"gain": {"label": "Level"}}, "Extra": {"mode": {"type": "STRING"}}}"#,
            "leaf.mtd",
        )
        .unwrap();

        let mut merged = base.clone();
        merged.merge(&leaf);
        assert_eq!(merged.property("Inputs", "gain", "label"), Some(&json!("Level")));
        assert_eq!(merged.property("Inputs", "gain", "type"), Some(&json!("FLOAT")));
        assert_eq!(merged.attributes("Extra"), vec!["mode"]);

        // the base is untouched
        base.merge(&Metadata::new());
        assert_eq!(base, original);
    }

    #[test]
    fn test_from_lineage_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.mtd");
        std::fs::write(&base, r#"{"Inputs": {"a": {"type": "INT"}}}"#).unwrap();
        let missing = dir.path().join("missing.mtd");

        let merged = Metadata::from_lineage([base.as_path(), missing.as_path()]);
        assert_eq!(merged.attributes("Inputs"), vec!["a"]);
    }

    #[test]
    fn test_spec_from_properties() {
        let spec = AttributeSpec::from_properties(
            "Inputs",
            "inputA",
            &bag(json!({
                "default": {"type": "MERGE", "value": ""},
                "connectable": true,
                "connection_type": "INPUT",
                "required": {"value": true},
                "widget": "merge_box"
            })),
        )
        .unwrap();
        assert_eq!(spec.kind, AttrKind::DataReference(AttrType::Merge));
        assert_eq!(spec.default, AttrValue::List(Vec::new()));
        assert_eq!(
            spec.connection,
            Some(ConnectionSpec {
                role: ConnectionRole::Input,
                max_connections: Some(1)
            })
        );
        assert!(spec.required);
        assert_eq!(spec.extra.get("widget"), Some(&json!("merge_box")));

        let output = AttributeSpec::from_properties(
            "Outputs",
            "out",
            &bag(json!({"connectable": true, "connection_type": "output"})),
        )
        .unwrap();
        assert_eq!(output.connection.and_then(|c| c.max_connections), None);
        assert_eq!(output.kind, AttrKind::Untyped);
    }

    #[test]
    fn test_spec_rejects_malformed_entries() {
        let cases = [
            json!({"type": "MATRIX"}),
            json!({"type": "FLOAT", "default": "abc"}),
            json!({"connectable": true}),
            json!({"connectable": true, "connection_type": "sideways"}),
            json!({"connectable": true, "connection_type": "input", "max_connections": 0}),
            json!({"label": 4}),
            json!({"required": "yes"}),
        ];
        for case in cases {
            let result = AttributeSpec::from_properties("Inputs", "bad", &bag(case.clone()));
            assert!(
                matches!(result, Err(MetadataError::InvalidAttribute { .. })),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn test_connection_queries() {
        let metadata = MetadataParser::parse_str(
            r#"{"Inputs": {
                "inputA": {"connectable": true, "connection_type": "input"},
                "inputB": {"connectable": true, "connection_type": "input", "max_connections": 3},
                "result": {"connectable": true, "connection_type": "output"},
                "note": {"type": "STRING"}
            }}"#,
            "merge.mtd",
        )
        .unwrap();
        let inputs: Vec<_> = metadata.input_connections().into_iter().map(|s| s.name).collect();
        assert_eq!(inputs, vec!["inputA", "inputB"]);
        assert_eq!(metadata.output_connections().len(), 1);
        assert_eq!(metadata.find("note").map(|(section, _)| section), Some("Inputs"));
    }
}
