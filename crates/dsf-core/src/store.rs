//! Object model store.
//!
//! The store owns the live object model and applies mutations to it. Every
//! mutation yields a [`ModelChange`] describing the concrete path that was
//! touched, so that subscribers can decide whether they are affected.

use std::sync::Arc;

use crate::model::{check_kind, ModelError, ModelNode};
use crate::object_model::object_model;
use crate::path::{format_path, PathElement};

/// A single mutation of the object model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChange {
    /// Concrete path of the changed value
    pub path: Vec<PathElement>,
}

impl ModelChange {
    pub fn new(path: Vec<PathElement>) -> Self {
        Self { path }
    }
}

impl std::fmt::Display for ModelChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_path(&self.path))
    }
}

/// Trait for object model storage implementations.
pub trait ObjectModelStore: Send + Sync {
    /// Get the model root.
    fn root(&self) -> &ModelNode;

    /// Get the node at a concrete path.
    fn get(&self, path: &[PathElement]) -> Option<&ModelNode>;

    /// Replace the value at a concrete path.
    fn set(&mut self, path: &[PathElement], value: ModelNode) -> Result<ModelChange, ModelError>;

    /// Append an item to the list at a concrete path.
    fn push_item(
        &mut self,
        path: &[PathElement],
        item: ModelNode,
    ) -> Result<ModelChange, ModelError>;

    /// Number of mutations applied so far.
    fn sequence(&self) -> u64;
}

/// In-memory object model.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    root: ModelNode,
    sequence: u64,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new(object_model())
    }
}

impl MemoryModel {
    pub fn new(root: ModelNode) -> Self {
        Self { root, sequence: 0 }
    }

    /// Set a global variable, creating it if necessary.
    pub fn set_global(
        &mut self,
        name: &str,
        value: impl Into<ModelNode>,
    ) -> Result<ModelChange, ModelError> {
        self.set(&[PathElement::name("global"), PathElement::name(name)], value.into())
    }

    /// Delete a global variable. Returns `None` if it did not exist.
    pub fn remove_global(&mut self, name: &str) -> Option<ModelChange> {
        let global = property_mut(&mut self.root, "global").ok()?.as_map_mut()?;
        let key = find_key(global, name)?;
        global.shift_remove(&key);
        self.sequence += 1;
        Some(ModelChange::new(vec![
            PathElement::name("global"),
            PathElement::name(key),
        ]))
    }
}

impl ObjectModelStore for MemoryModel {
    fn root(&self) -> &ModelNode {
        &self.root
    }

    fn get(&self, path: &[PathElement]) -> Option<&ModelNode> {
        path.iter()
            .try_fold(&self.root, |node, element| child(node, element))
    }

    fn set(&mut self, path: &[PathElement], value: ModelNode) -> Result<ModelChange, ModelError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| ModelError::InvalidPath(String::new()))?;

        let mut node = &mut self.root;
        for element in parents {
            node = child_mut(node, element)?;
        }

        match last {
            PathElement::Name(name) => assign(node, name, value)?,
            PathElement::Item { .. } => *child_mut(node, last)? = value,
        }

        self.sequence += 1;
        Ok(ModelChange::new(path.to_vec()))
    }

    fn push_item(
        &mut self,
        path: &[PathElement],
        item: ModelNode,
    ) -> Result<ModelChange, ModelError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| ModelError::InvalidPath(String::new()))?;
        let PathElement::Name(name) = last else {
            return Err(ModelError::InvalidPath(format_path(path)));
        };

        let mut node = &mut self.root;
        for element in parents {
            node = child_mut(node, element)?;
        }
        let ModelNode::List(list) = property_mut(node, name)? else {
            return Err(ModelError::InvalidPath(format_path(path)));
        };
        list.push(item);
        let index = list.len() - 1;

        self.sequence += 1;
        let mut changed = parents.to_vec();
        changed.push(PathElement::item(name.as_str(), index));
        Ok(ModelChange::new(changed))
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

fn find_key(map: &crate::model::ModelMap, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    map.keys().find(|key| key.eq_ignore_ascii_case(name)).cloned()
}

fn child<'a>(node: &'a ModelNode, element: &PathElement) -> Option<&'a ModelNode> {
    let name = match element {
        PathElement::Name(name) | PathElement::Item { name, .. } => name,
    };
    let value = match node {
        ModelNode::Structured(structured) => structured.get(name)?,
        ModelNode::Map(map) => map.get(&find_key(map, name)?)?,
        _ => return None,
    };
    match element {
        PathElement::Name(_) => Some(value),
        PathElement::Item { index, .. } => value.as_list()?.get(*index),
    }
}

fn property_mut<'a>(node: &'a mut ModelNode, name: &str) -> Result<&'a mut ModelNode, ModelError> {
    match node {
        ModelNode::Structured(structured) => Arc::make_mut(structured)
            .get_mut(name)
            .map(|(_, value)| value)
            .ok_or_else(|| ModelError::UnknownProperty(name.to_string())),
        ModelNode::Map(map) => {
            let key =
                find_key(map, name).ok_or_else(|| ModelError::UnknownProperty(name.to_string()))?;
            map.get_mut(&key)
                .ok_or_else(|| ModelError::UnknownProperty(name.to_string()))
        }
        _ => Err(ModelError::InvalidPath(name.to_string())),
    }
}

fn child_mut<'a>(
    node: &'a mut ModelNode,
    element: &PathElement,
) -> Result<&'a mut ModelNode, ModelError> {
    match element {
        PathElement::Name(name) => property_mut(node, name),
        PathElement::Item { name, index } => match property_mut(node, name)? {
            ModelNode::List(list) => {
                let len = list.len();
                list.get_mut(*index).ok_or_else(|| ModelError::IndexOutOfRange {
                    name: name.clone(),
                    index: *index,
                    len,
                })
            }
            _ => Err(ModelError::InvalidPath(element.to_string())),
        },
    }
}

/// Assign a named value. Structured properties are checked against their
/// declared kind, map entries are created on demand.
fn assign(node: &mut ModelNode, name: &str, value: ModelNode) -> Result<(), ModelError> {
    match node {
        ModelNode::Structured(structured) => {
            let structured = Arc::make_mut(structured);
            let (def, slot) = structured
                .get_mut(name)
                .ok_or_else(|| ModelError::UnknownProperty(name.to_string()))?;
            check_kind(def, &value)?;
            *slot = value;
            Ok(())
        }
        ModelNode::Map(map) => {
            let key = find_key(map, name).unwrap_or_else(|| name.to_string());
            map.insert(key, value);
            Ok(())
        }
        _ => Err(ModelError::InvalidPath(name.to_string())),
    }
}
