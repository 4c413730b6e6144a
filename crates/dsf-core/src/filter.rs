//! Partial object model extraction.
//!
//! Three ways to read the model through a parsed filter:
//! - [`project`] builds a partial copy containing only matched subtrees
//! - [`merge_into`] folds several partial copies into one
//! - [`resolve`] walks a wildcard-free path to a single value
//!
//! Make sure the model is locked for reading while any of these run.

use serde_json::Value;
use std::sync::Arc;

use crate::model::{ModelList, ModelMap, ModelNode, Structured};
use crate::path::PathToken;
use crate::schema::ElementKind;

// ============================================================================
// Projection
// ============================================================================

/// Get a partial object model with only the fields matching the filter.
///
/// Lists keep their length: unmatched items are replaced with empty
/// placeholders so that index `i` of the result corresponds to index `i`
/// of the source. Returns `None` if nothing matched.
pub fn project(model: &ModelNode, filter: &[PathToken]) -> Option<ModelNode> {
    let (token, rest) = filter.split_first()?;

    match (token, model) {
        (PathToken::Name(_), ModelNode::Structured(structured)) => {
            project_structured(structured, token, rest)
        }
        (PathToken::Name(_), ModelNode::Map(map)) => project_entries(
            map.iter().map(|(key, value)| (key.as_str(), value)),
            token,
            rest,
        ),
        (PathToken::Name(_), ModelNode::Blob(blob)) => project_json(blob, filter),
        (PathToken::Index(index), ModelNode::List(list)) => project_list(list, *index, rest),
        (PathToken::Index(_), ModelNode::Blob(blob)) => project_json(blob, filter),
        _ => None,
    }
}

/// Same as [`project`] but returns an empty map when nothing matched.
pub fn get_filtered(model: &ModelNode, filter: &[PathToken]) -> ModelNode {
    project(model, filter).unwrap_or_else(ModelNode::empty_map)
}

/// Whether the remaining filter means "take the whole value".
fn captures_whole(rest: &[PathToken]) -> bool {
    match rest {
        [] => true,
        [last] => last.is_recursive_wildcard(),
        _ => false,
    }
}

fn project_structured(
    structured: &Structured,
    token: &PathToken,
    rest: &[PathToken],
) -> Option<ModelNode> {
    let mut result = ModelMap::new();
    for (def, value) in structured.properties() {
        if !token.matches_name(def.name) {
            continue;
        }

        if captures_whole(rest) {
            result.insert(def.name.to_string(), value.clone());
        } else if def.kind.is_descendable() {
            if let Some(sub) = project(value, rest) {
                result.insert(def.name.to_string(), sub);
            }
        }
    }
    (!result.is_empty()).then_some(ModelNode::Map(result))
}

fn project_entries<'a>(
    entries: impl Iterator<Item = (&'a str, &'a ModelNode)>,
    token: &PathToken,
    rest: &[PathToken],
) -> Option<ModelNode> {
    let mut result = ModelMap::new();
    for (key, value) in entries {
        if !token.matches_name(key) {
            continue;
        }

        if captures_whole(rest) {
            result.insert(key.to_string(), value.clone());
        } else if let Some(sub) = project(value, rest) {
            result.insert(key.to_string(), sub);
        }
    }
    (!result.is_empty()).then_some(ModelNode::Map(result))
}

fn project_list(list: &ModelList, index: i32, rest: &[PathToken]) -> Option<ModelNode> {
    let selected = selected_index(index, list.len())?;
    let element = list.element();

    // Value lists and fully selected lists are returned as they are
    if !element.is_container() || (selected.is_none() && rest.is_empty()) {
        return Some(ModelNode::List(list.clone()));
    }

    let items = list
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if item.is_null() {
                return ModelNode::Null;
            }
            if selected.is_some_and(|s| s != i) {
                return ModelNode::placeholder(element);
            }
            if rest.is_empty() {
                return item.clone();
            }
            project(item, rest).unwrap_or_else(|| ModelNode::placeholder(element))
        })
        .collect();
    Some(ModelNode::List(ModelList::with_items(element, items)))
}

/// Validate an index token against a list length.
///
/// Returns `Some(None)` for "all items", `Some(Some(i))` for a single item
/// and `None` if the index is out of range.
fn selected_index(index: i32, len: usize) -> Option<Option<usize>> {
    if index == -1 {
        return Some(None);
    }
    let index = usize::try_from(index).ok()?;
    (index < len).then_some(Some(index))
}

/// Projection over an already-serialized fragment.
///
/// Objects become maps, arrays keep their length with placeholders derived
/// from each element's own shape, captured values stay blobs.
fn project_json(value: &Value, filter: &[PathToken]) -> Option<ModelNode> {
    let (token, rest) = filter.split_first()?;

    match (token, value) {
        (PathToken::Name(_), Value::Object(object)) => {
            let mut result = ModelMap::new();
            for (key, member) in object {
                if !token.matches_name(key) {
                    continue;
                }
                if captures_whole(rest) {
                    result.insert(key.clone(), ModelNode::blob(member.clone()));
                } else if let Some(sub) = project_json(member, rest) {
                    result.insert(key.clone(), sub);
                }
            }
            (!result.is_empty()).then_some(ModelNode::Map(result))
        }
        (PathToken::Index(index), Value::Array(items)) => {
            let selected = selected_index(*index, items.len())?;
            let is_value_array = items.iter().all(|item| !item.is_object() && !item.is_array());
            if is_value_array || (selected.is_none() && rest.is_empty()) {
                return Some(ModelNode::blob(value.clone()));
            }

            let items = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let placeholder = json_placeholder(item);
                    if item.is_null() {
                        ModelNode::Null
                    } else if selected.is_some_and(|s| s != i) {
                        placeholder
                    } else if rest.is_empty() {
                        ModelNode::blob(item.clone())
                    } else {
                        project_json(item, rest).unwrap_or(placeholder)
                    }
                })
                .collect();
            Some(ModelNode::List(ModelList::with_items(ElementKind::Scalar, items)))
        }
        _ => None,
    }
}

fn json_placeholder(item: &Value) -> ModelNode {
    if item.is_array() {
        ModelNode::placeholder(ElementKind::List)
    } else {
        ModelNode::empty_map()
    }
}

// ============================================================================
// Merging
// ============================================================================

/// Merge the partial model `incoming` into `target`.
///
/// Missing keys are added, maps are merged recursively and lists of equal
/// length are merged item by item. Lists of different lengths cannot be
/// aligned, in that case the existing list is kept.
pub fn merge_into(target: &mut ModelMap, incoming: ModelMap) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

/// Merge a single partial node into an existing one.
///
/// Existing scalars and verbatim values (structured nodes, blobs) already
/// hold everything a projection of the same source can contain, so they are
/// only replaced when a scalar meets a container. A null or empty incoming
/// tree leaves the target untouched.
pub fn merge_nodes(target: &mut ModelNode, incoming: ModelNode) {
    match &incoming {
        ModelNode::Null => return,
        ModelNode::Map(map) if map.is_empty() => return,
        _ => {}
    }
    merge_value(target, incoming);
}

fn merge_value(target: &mut ModelNode, incoming: ModelNode) {
    match (target, incoming) {
        (ModelNode::Map(a), ModelNode::Map(b)) => merge_into(a, b),
        (ModelNode::List(a), ModelNode::List(b)) => merge_lists(a, b),
        (target, incoming) => {
            let replace = matches!(target, ModelNode::Map(_) | ModelNode::List(_))
                || (target.is_scalar() && !incoming.is_scalar());
            if replace {
                *target = incoming;
            }
        }
    }
}

fn merge_lists(target: &mut ModelList, incoming: ModelList) {
    if target.len() != incoming.len() {
        tracing::debug!(
            existing = target.len(),
            incoming = incoming.len(),
            "Skipping merge of lists with different lengths"
        );
        return;
    }

    for (a, b) in target.iter_mut().zip(incoming.into_items()) {
        merge_value(a, b);
    }
}

/// Merge two partial models and return the result.
pub fn merged(mut a: ModelNode, b: ModelNode) -> ModelNode {
    merge_nodes(&mut a, b);
    a
}

// ============================================================================
// Exact lookup
// ============================================================================

/// A value found by [`resolve`], borrowed from the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// A native model node
    Node(&'a ModelNode),
    /// A value inside a serialized fragment
    Json(&'a Value),
}

impl<'a> Resolved<'a> {
    /// Convert the found value into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Resolved::Node(node) => node.to_json(),
            Resolved::Json(value) => (*value).clone(),
        }
    }

    /// Copy the found value into an owned model node.
    pub fn to_node(&self) -> ModelNode {
        match self {
            Resolved::Node(node) => (*node).clone(),
            Resolved::Json(value) => json_to_node(value),
        }
    }
}

/// Convert a serialized value into a node, keeping containers as blobs.
fn json_to_node(value: &Value) -> ModelNode {
    match value {
        Value::Null => ModelNode::Null,
        Value::Bool(b) => ModelNode::Bool(*b),
        Value::Number(n) => ModelNode::Number(n.clone()),
        Value::String(s) => ModelNode::String(s.clone()),
        Value::Array(_) | Value::Object(_) => ModelNode::Blob(Arc::new(value.clone())),
    }
}

/// Find a specific value in the object model. Wildcards are not supported.
///
/// With `restricted_only` set, a value is only returned if the path crosses
/// at least one restricted property; once crossed, every descendant counts
/// as restricted as well.
pub fn resolve<'a>(
    model: &'a ModelNode,
    path: &[PathToken],
    restricted_only: bool,
) -> Option<Resolved<'a>> {
    Lookup { restricted_only }.node(model, path, false)
}

#[derive(Clone, Copy)]
struct Lookup {
    restricted_only: bool,
}

impl Lookup {
    fn visible(&self, had_restricted: bool) -> bool {
        !self.restricted_only || had_restricted
    }

    /// Either return the value at the end of the path or keep descending.
    fn found<'a>(
        &self,
        value: Resolved<'a>,
        rest: &[PathToken],
        had_restricted: bool,
    ) -> Option<Resolved<'a>> {
        if rest.is_empty() {
            return self.visible(had_restricted).then_some(value);
        }
        match value {
            Resolved::Node(node) if node.is_container() => self.node(node, rest, had_restricted),
            Resolved::Json(json) => self.json(json, rest, had_restricted),
            _ => None,
        }
    }

    fn node<'a>(
        &self,
        model: &'a ModelNode,
        path: &[PathToken],
        had_restricted: bool,
    ) -> Option<Resolved<'a>> {
        let (token, rest) = path.split_first()?;

        match (token, model) {
            (PathToken::Name(name), ModelNode::Structured(structured)) => {
                let (def, value) = structured.property(name)?;
                let had_restricted = had_restricted || (self.restricted_only && def.restricted);
                if !rest.is_empty() && !def.kind.is_descendable() {
                    return None;
                }
                self.found(Resolved::Node(value), rest, had_restricted)
            }
            (PathToken::Name(name), ModelNode::Map(map)) => {
                let value = lookup_key(map, name)?;
                self.found(Resolved::Node(value), rest, had_restricted)
            }
            (PathToken::Name(_), ModelNode::Blob(blob)) => self.json(blob, path, had_restricted),
            (PathToken::Index(index), ModelNode::List(list)) if self.visible(had_restricted) => {
                let item = list.get(usize::try_from(*index).ok()?)?;
                self.found(Resolved::Node(item), rest, had_restricted)
            }
            (PathToken::Index(_), ModelNode::Blob(blob)) => self.json(blob, path, had_restricted),
            _ => None,
        }
    }

    fn json<'a>(
        &self,
        value: &'a Value,
        path: &[PathToken],
        had_restricted: bool,
    ) -> Option<Resolved<'a>> {
        let (token, rest) = path.split_first()?;

        match (token, value) {
            (PathToken::Name(name), Value::Object(object)) => {
                let member = object.get(name.as_str()).or_else(|| {
                    object
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, member)| member)
                })?;
                self.found(Resolved::Json(member), rest, had_restricted)
            }
            (PathToken::Index(index), Value::Array(items)) if self.visible(had_restricted) => {
                let item = items.get(usize::try_from(*index).ok()?)?;
                self.found(Resolved::Json(item), rest, had_restricted)
            }
            _ => None,
        }
    }
}

/// Map lookup preferring an exact key over a case-insensitive one.
fn lookup_key<'a>(map: &'a ModelMap, name: &str) -> Option<&'a ModelNode> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
