//! Object model node types.
//!
//! The live machine model is a heterogeneous tree:
//! - Structured nodes with a static property registry ([`Schema`])
//! - Lists with a declared element kind
//! - Open maps for dynamically named entries (e.g. global variables)
//! - Blobs, i.e. already-serialized JSON fragments handed over by other subsystems
//! - Scalars
//!
//! Structured nodes and blobs are reference-counted so that partial copies of
//! the model share their leaves with the source tree.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};
use std::sync::Arc;

use crate::schema::{ElementKind, PropertyDef, PropertyKind, Schema};

/// Insertion-ordered map used for open map nodes and projected objects.
pub type ModelMap = IndexMap<String, ModelNode>;

/// A node of the object model.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelNode {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Fixed-schema object
    Structured(Arc<Structured>),
    /// Ordered list
    List(ModelList),
    /// Open key/value map
    Map(ModelMap),
    /// Pre-serialized JSON fragment
    Blob(Arc<Value>),
}

impl ModelNode {
    /// Create an empty map node.
    pub fn empty_map() -> Self {
        ModelNode::Map(ModelMap::new())
    }

    /// Create a blob node from a JSON value.
    pub fn blob(value: Value) -> Self {
        ModelNode::Blob(Arc::new(value))
    }

    /// Placeholder for an unmatched slot of a list with the given element kind.
    pub fn placeholder(element: ElementKind) -> Self {
        match element {
            ElementKind::List => ModelNode::List(ModelList::new(ElementKind::Scalar)),
            _ => ModelNode::empty_map(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ModelNode::Null)
    }

    /// Whether this node is a scalar value (including null).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ModelNode::Null | ModelNode::Bool(_) | ModelNode::Number(_) | ModelNode::String(_)
        )
    }

    /// Whether a path may descend below this node.
    pub fn is_container(&self) -> bool {
        match self {
            ModelNode::Structured(_) | ModelNode::List(_) | ModelNode::Map(_) => true,
            ModelNode::Blob(value) => value.is_object() || value.is_array(),
            _ => false,
        }
    }

    pub fn as_structured(&self) -> Option<&Structured> {
        match self {
            ModelNode::Structured(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ModelList> {
        match self {
            ModelNode::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ModelMap> {
        match self {
            ModelNode::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ModelMap> {
        match self {
            ModelNode::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this is a map or list without entries.
    pub fn is_empty_container(&self) -> bool {
        match self {
            ModelNode::Map(map) => map.is_empty(),
            ModelNode::List(list) => list.is_empty(),
            _ => false,
        }
    }

    /// Convert this node into a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            ModelNode::Null => Value::Null,
            ModelNode::Bool(b) => Value::Bool(*b),
            ModelNode::Number(n) => Value::Number(n.clone()),
            ModelNode::String(s) => Value::String(s.clone()),
            ModelNode::Structured(s) => Value::Object(
                s.properties()
                    .map(|(def, value)| (def.name.to_string(), value.to_json()))
                    .collect(),
            ),
            ModelNode::List(list) => Value::Array(list.iter().map(ModelNode::to_json).collect()),
            ModelNode::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            ModelNode::Blob(value) => value.as_ref().clone(),
        }
    }
}

impl Serialize for ModelNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ModelNode::Null => serializer.serialize_unit(),
            ModelNode::Bool(b) => serializer.serialize_bool(*b),
            ModelNode::Number(n) => n.serialize(serializer),
            ModelNode::String(s) => serializer.serialize_str(s),
            ModelNode::Structured(s) => s.serialize(serializer),
            ModelNode::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ModelNode::Map(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    ser.serialize_entry(key, value)?;
                }
                ser.end()
            }
            ModelNode::Blob(value) => value.serialize(serializer),
        }
    }
}

impl From<bool> for ModelNode {
    fn from(value: bool) -> Self {
        ModelNode::Bool(value)
    }
}

impl From<i64> for ModelNode {
    fn from(value: i64) -> Self {
        ModelNode::Number(value.into())
    }
}

impl From<i32> for ModelNode {
    fn from(value: i32) -> Self {
        ModelNode::Number(value.into())
    }
}

impl From<f64> for ModelNode {
    /// Non-finite values have no JSON representation and become null.
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(ModelNode::Number)
            .unwrap_or(ModelNode::Null)
    }
}

impl From<&str> for ModelNode {
    fn from(value: &str) -> Self {
        ModelNode::String(value.to_string())
    }
}

impl From<String> for ModelNode {
    fn from(value: String) -> Self {
        ModelNode::String(value)
    }
}

impl From<Structured> for ModelNode {
    fn from(value: Structured) -> Self {
        ModelNode::Structured(Arc::new(value))
    }
}

impl From<ModelList> for ModelNode {
    fn from(value: ModelList) -> Self {
        ModelNode::List(value)
    }
}

impl From<ModelMap> for ModelNode {
    fn from(value: ModelMap) -> Self {
        ModelNode::Map(value)
    }
}

impl<T: Into<ModelNode>> From<Option<T>> for ModelNode {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ModelNode::Null)
    }
}

/// An ordered list of nodes with a declared element kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelList {
    element: ElementKind,
    items: Vec<ModelNode>,
}

impl ModelList {
    pub fn new(element: ElementKind) -> Self {
        Self {
            element,
            items: Vec::new(),
        }
    }

    pub fn with_items(element: ElementKind, items: Vec<ModelNode>) -> Self {
        Self { element, items }
    }

    /// Declared element kind.
    pub fn element(&self) -> ElementKind {
        self.element
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModelNode> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ModelNode> {
        self.items.get_mut(index)
    }

    pub fn push(&mut self, item: impl Into<ModelNode>) {
        self.items.push(item.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelNode> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ModelNode> {
        self.items.iter_mut()
    }

    pub fn into_items(self) -> Vec<ModelNode> {
        self.items
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }
}

impl<'a> IntoIterator for &'a ModelList {
    type Item = &'a ModelNode;
    type IntoIter = std::slice::Iter<'a, ModelNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A fixed-schema object. Values are stored in registry order.
#[derive(Clone)]
pub struct Structured {
    schema: &'static Schema,
    values: Vec<ModelNode>,
}

impl Structured {
    /// Create a node with every property set to its default value.
    ///
    /// Nested structured properties are instantiated, lists and maps start
    /// empty, scalars and blobs start as null.
    pub fn new(schema: &'static Schema) -> Self {
        let values = schema
            .properties
            .iter()
            .map(|def| match def.kind {
                PropertyKind::Scalar | PropertyKind::Blob => ModelNode::Null,
                PropertyKind::Structured(nested) => Structured::new(nested).into(),
                PropertyKind::List(element) => ModelList::new(element).into(),
                PropertyKind::Map => ModelNode::empty_map(),
            })
            .collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Get a property value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ModelNode> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    /// Get a property definition and value by name (case-insensitive).
    pub fn property(&self, name: &str) -> Option<(&'static PropertyDef, &ModelNode)> {
        let index = self.schema.position(name)?;
        Some((&self.schema.properties[index], &self.values[index]))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<(&'static PropertyDef, &mut ModelNode)> {
        let index = self.schema.position(name)?;
        Some((&self.schema.properties[index], &mut self.values[index]))
    }

    /// Iterate over all properties in registry order.
    pub fn properties(&self) -> impl Iterator<Item = (&'static PropertyDef, &ModelNode)> {
        self.schema.properties.iter().zip(self.values.iter())
    }

    /// Set a property value, checking it against the declared kind.
    pub fn set(&mut self, name: &str, value: impl Into<ModelNode>) -> Result<(), ModelError> {
        let value = value.into();
        let (def, slot) = self
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownProperty(name.to_string()))?;
        check_kind(def, &value)?;
        *slot = value;
        Ok(())
    }

    /// Builder-style variant of [`Structured::set`].
    pub fn with(mut self, name: &str, value: impl Into<ModelNode>) -> Result<Self, ModelError> {
        self.set(name, value)?;
        Ok(self)
    }
}

impl PartialEq for Structured {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl std::fmt::Debug for Structured {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (def, value) in self.properties() {
            map.entry(&def.name, value);
        }
        map.finish()
    }
}

impl Serialize for Structured {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (def, value) in self.properties() {
            map.serialize_entry(def.name, value)?;
        }
        map.end()
    }
}

/// Check that a value may be stored in a property. Null is always accepted.
pub(crate) fn check_kind(def: &PropertyDef, value: &ModelNode) -> Result<(), ModelError> {
    let accepted = match (&def.kind, value) {
        (_, ModelNode::Null) => true,
        (PropertyKind::Scalar, value) => value.is_scalar(),
        (PropertyKind::Structured(schema), ModelNode::Structured(s)) => s.schema == *schema,
        (PropertyKind::List(_), ModelNode::List(_)) => true,
        (PropertyKind::Map, ModelNode::Map(_)) => true,
        (PropertyKind::Blob, ModelNode::Blob(_)) => true,
        _ => false,
    };
    if accepted {
        Ok(())
    } else {
        Err(ModelError::KindMismatch {
            property: def.name.to_string(),
            expected: def.kind,
        })
    }
}

/// Errors raised when mutating the object model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Property {property} expects a value of kind {expected:?}")]
    KindMismatch {
        property: String,
        expected: PropertyKind,
    },

    #[error("Index {index} out of range for {name} (length {len})")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Path does not address a model node: {0}")]
    InvalidPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    static TOOL: Schema = Schema {
        name: "Tool",
        properties: &[
            PropertyDef::scalar("name"),
            PropertyDef::list("offsets", ElementKind::Scalar),
            PropertyDef::map("extra"),
        ],
    };

    #[test]
    fn test_new_structured_defaults() {
        let tool = Structured::new(&TOOL);
        assert_eq!(tool.get("name"), Some(&ModelNode::Null));
        assert!(tool.get("offsets").and_then(ModelNode::as_list).is_some());
        assert!(tool.get("extra").and_then(ModelNode::as_map).is_some());
    }

    #[test]
    fn test_set_checks_kind() {
        let mut tool = Structured::new(&TOOL);
        tool.set("NAME", "T0").unwrap();
        assert_eq!(tool.get("name"), Some(&ModelNode::from("T0")));

        let err = tool.set("offsets", 1.5).unwrap_err();
        assert!(matches!(err, ModelError::KindMismatch { .. }));

        let err = tool.set("missing", true).unwrap_err();
        assert_eq!(err, ModelError::UnknownProperty("missing".to_string()));
    }

    #[test]
    fn test_serialize_uses_registry_names() {
        let mut offsets = ModelList::new(ElementKind::Scalar);
        offsets.push(0.5);
        offsets.push(-1);
        let tool = Structured::new(&TOOL)
            .with("name", "T0")
            .unwrap()
            .with("offsets", offsets)
            .unwrap();

        let json = serde_json::to_value(ModelNode::from(tool.clone())).unwrap();
        assert_eq!(json, json!({"name": "T0", "offsets": [0.5, -1], "extra": {}}));
        assert_eq!(ModelNode::from(tool).to_json(), json);
    }

    #[test]
    fn test_placeholder_shape() {
        assert_eq!(
            ModelNode::placeholder(ElementKind::Structured(&TOOL)),
            ModelNode::empty_map()
        );
        assert!(matches!(
            ModelNode::placeholder(ElementKind::List),
            ModelNode::List(ref l) if l.is_empty()
        ));
    }

    #[test]
    fn test_non_finite_number_is_null() {
        assert_eq!(ModelNode::from(f64::NAN), ModelNode::Null);
    }
}
