//! # dsf-server
//!
//! Object model server with filtered subscriptions.
//!
//! The runtime-agnostic [`subscription`] module decides what each client
//! receives. The `tokio-runtime` feature (default) adds the shared model
//! provider and the WebSocket IPC server.

pub mod subscription;

#[cfg(feature = "tokio-runtime")]
pub mod provider;
#[cfg(feature = "tokio-runtime")]
pub mod server;

pub use dsf_core::{MemoryModel, ModelChange, ModelNode, ObjectModelStore};
pub use subscription::{query, SubscriptionManager};

#[cfg(feature = "tokio-runtime")]
pub use provider::{ChangeSet, ModelProvider, ModelReadGuard, ModelWriteGuard};
#[cfg(feature = "tokio-runtime")]
pub use server::{ObjectModelServer, ServerConfig, ServerError};
