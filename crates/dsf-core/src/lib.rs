//! # dsf-core
//!
//! Machine object model and filter engine.
//!
//! This crate provides:
//! - Object model types (structured nodes, lists, maps, blobs) and property registries
//! - Filter parsing and change path matching
//! - Projection, merging and exact lookup through filters
//! - In-memory model store and server settings
//!
//! This crate contains no async code. Callers are responsible for holding the
//! appropriate model lock while reading through a filter.

pub mod config;
pub mod filter;
pub mod model;
pub mod object_model;
pub mod path;
pub mod schema;
pub mod store;

pub use config::{ConfigError, ServerSettings};
pub use filter::{get_filtered, merge_into, merge_nodes, merged, project, resolve, Resolved};
pub use model::{ModelError, ModelList, ModelMap, ModelNode, Structured};
pub use path::{
    format_path, parse_filter, parse_filters, path_matches, path_to_filter, Filter, FilterError,
    ParseMode, PathElement, PathToken,
};
pub use store::{MemoryModel, ModelChange, ObjectModelStore};
