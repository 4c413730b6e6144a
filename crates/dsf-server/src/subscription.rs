//! Subscription management for object model clients.
//!
//! This module handles per-client filters, deciding which model changes
//! concern a client and building the partial models it receives.

use dsf_core::{
    merge_nodes, parse_filter, parse_filters, path_matches, path_to_filter, project, resolve,
    Filter, FilterError, ModelChange, ModelNode, ObjectModelStore, ParseMode, PathElement,
    PathToken,
};
use dsf_protocol::SubscriptionMode;
use serde_json::Value;

/// Manages the subscription of a single client connection.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    mode: SubscriptionMode,
    /// Parsed filters, empty means the whole model
    filters: Vec<Filter>,
}

impl SubscriptionManager {
    /// Create a subscription from filter strings.
    ///
    /// Each entry may hold several filters separated by `,`, `|`, line breaks or spaces.
    pub fn new(mode: SubscriptionMode, filters: &[String]) -> Result<Self, FilterError> {
        let mut parsed = Vec::new();
        for text in filters {
            parsed.extend(parse_filters(text)?);
        }
        Ok(Self::with_filters(mode, parsed))
    }

    pub fn with_filters(mode: SubscriptionMode, filters: Vec<Filter>) -> Self {
        Self { mode, filters }
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Build the complete filtered model.
    pub fn initial_model<S: ObjectModelStore + ?Sized>(&self, store: &S) -> ModelNode {
        if self.filters.is_empty() {
            return store.root().clone();
        }

        let mut model = ModelNode::empty_map();
        for filter in &self.filters {
            if let Some(partial) = project(store.root(), filter.tokens()) {
                merge_nodes(&mut model, partial);
            }
        }
        model
    }

    /// Check if a change alters anything this client receives.
    pub fn is_affected(&self, change: &ModelChange) -> bool {
        self.filters.is_empty()
            || self.filters.iter().any(|filter| {
                selects_within(&change.path, filter.tokens())
                    || replaces_ancestor(&change.path, filter.tokens())
            })
    }

    /// Build the update for a batch of changes.
    ///
    /// Returns None if none of the changes concern this client.
    pub fn update<S: ObjectModelStore + ?Sized>(
        &self,
        store: &S,
        changes: &[ModelChange],
    ) -> Option<ModelNode> {
        match self.mode {
            SubscriptionMode::Full => changes
                .iter()
                .any(|change| self.is_affected(change))
                .then(|| self.initial_model(store)),
            SubscriptionMode::Patch => {
                let mut patch = ModelNode::empty_map();
                for change in changes {
                    if let Some(partial) = self.patch_for(store.root(), change) {
                        merge_nodes(&mut patch, partial);
                    }
                }
                (!patch.is_empty_container()).then_some(patch)
            }
        }
    }

    fn patch_for(&self, root: &ModelNode, change: &ModelChange) -> Option<ModelNode> {
        let path = &change.path;
        if self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|filter| selects_within(path, filter.tokens()))
        {
            return changed_value(root, path);
        }

        // A parent was replaced, send what the affected filters select below it
        let mut patch: Option<ModelNode> = None;
        for filter in &self.filters {
            if !replaces_ancestor(path, filter.tokens()) {
                continue;
            }
            if let Some(partial) = project(root, filter.tokens()) {
                match patch.as_mut() {
                    Some(existing) => merge_nodes(existing, partial),
                    None => patch = Some(partial),
                }
            }
        }
        patch
    }
}

/// Whether the change lies on or below a value the filter selects.
fn selects_within(path: &[PathElement], filter: &[PathToken]) -> bool {
    (1..=path.len()).any(|len| path_matches(&path[..len], filter))
}

/// Whether the change replaced a parent of the values the filter selects.
fn replaces_ancestor(path: &[PathElement], filter: &[PathToken]) -> bool {
    (1..filter.len()).any(|len| path_matches(path, &filter[..len]))
}

/// Project the value at a change path. Removed entries are reported
/// through their parent.
fn changed_value(root: &ModelNode, path: &[PathElement]) -> Option<ModelNode> {
    project(root, &path_to_filter(path)).or_else(|| {
        let (_, parent) = path.split_last()?;
        project(root, &path_to_filter(parent))
    })
}

/// Look up a single value by path.
///
/// With `restricted_only` set, only values maintained by the control server
/// itself are returned.
pub fn query<S: ObjectModelStore + ?Sized>(
    store: &S,
    path: &str,
    restricted_only: bool,
) -> Result<Option<Value>, FilterError> {
    let tokens = parse_filter(path, ParseMode::Path)?;
    Ok(resolve(store.root(), &tokens, restricted_only).map(|value| value.to_json()))
}
