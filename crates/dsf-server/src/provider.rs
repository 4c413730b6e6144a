//! Shared access to the live object model.
//!
//! All readers and writers go through [`ModelProvider`]. Write guards record
//! every mutation and publish them as one [`ChangeSet`] when released, so
//! connection handlers can rebuild their filtered views.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};

use dsf_core::{MemoryModel, ModelChange, ModelError, ModelNode, ObjectModelStore, PathElement};

/// Mutations applied while a single write lock was held.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Model sequence number after the last change
    pub sequence: u64,
    pub changes: Vec<ModelChange>,
}

/// Shared handle to the object model.
#[derive(Clone)]
pub struct ModelProvider {
    model: Arc<RwLock<MemoryModel>>,
    changes_tx: broadcast::Sender<ChangeSet>,
    /// Locks held longer than this are reported, `None` disables the check
    max_lock_time: Option<Duration>,
}

impl ModelProvider {
    pub fn new(model: MemoryModel, max_lock_time: Duration) -> Self {
        let (changes_tx, _) = broadcast::channel(1024);
        Self {
            model: Arc::new(RwLock::new(model)),
            changes_tx,
            max_lock_time: (!max_lock_time.is_zero()).then_some(max_lock_time),
        }
    }

    /// Receive a [`ChangeSet`] for every released write lock that changed the model.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes_tx.subscribe()
    }

    /// Lock the model for reading.
    pub async fn read(&self) -> ModelReadGuard {
        let guard = self.model.clone().read_owned().await;
        ModelReadGuard {
            guard,
            timer: LockTimer::start("read", self.max_lock_time),
        }
    }

    /// Lock the model for writing.
    pub async fn write(&self) -> ModelWriteGuard {
        let guard = self.model.clone().write_owned().await;
        ModelWriteGuard {
            guard,
            changes: Vec::new(),
            changes_tx: self.changes_tx.clone(),
            timer: LockTimer::start("write", self.max_lock_time),
        }
    }
}

impl Default for ModelProvider {
    fn default() -> Self {
        Self::new(MemoryModel::default(), Duration::ZERO)
    }
}

struct LockTimer {
    kind: &'static str,
    acquired: Instant,
    limit: Option<Duration>,
}

impl LockTimer {
    fn start(kind: &'static str, limit: Option<Duration>) -> Self {
        Self {
            kind,
            acquired: Instant::now(),
            limit,
        }
    }
}

impl Drop for LockTimer {
    fn drop(&mut self) {
        let held = self.acquired.elapsed();
        if let Some(limit) = self.limit {
            if held > limit {
                warn!(
                    kind = self.kind,
                    held_ms = held.as_millis() as u64,
                    limit_ms = limit.as_millis() as u64,
                    "Object model lock held too long"
                );
            }
        }
    }
}

/// Read access to the object model.
pub struct ModelReadGuard {
    guard: OwnedRwLockReadGuard<MemoryModel>,
    timer: LockTimer,
}

impl Deref for ModelReadGuard {
    type Target = MemoryModel;

    fn deref(&self) -> &MemoryModel {
        &self.guard
    }
}

/// Write access to the object model. Changes are published on drop.
pub struct ModelWriteGuard {
    guard: OwnedRwLockWriteGuard<MemoryModel>,
    changes: Vec<ModelChange>,
    changes_tx: broadcast::Sender<ChangeSet>,
    timer: LockTimer,
}

impl ModelWriteGuard {
    pub fn set(
        &mut self,
        path: &[PathElement],
        value: impl Into<ModelNode>,
    ) -> Result<(), ModelError> {
        let change = self.guard.set(path, value.into())?;
        self.changes.push(change);
        Ok(())
    }

    pub fn push_item(
        &mut self,
        path: &[PathElement],
        item: impl Into<ModelNode>,
    ) -> Result<(), ModelError> {
        let change = self.guard.push_item(path, item.into())?;
        self.changes.push(change);
        Ok(())
    }

    pub fn set_global(
        &mut self,
        name: &str,
        value: impl Into<ModelNode>,
    ) -> Result<(), ModelError> {
        let change = self.guard.set_global(name, value)?;
        self.changes.push(change);
        Ok(())
    }

    /// Delete a global variable. Returns false if it did not exist.
    pub fn remove_global(&mut self, name: &str) -> bool {
        match self.guard.remove_global(name) {
            Some(change) => {
                self.changes.push(change);
                true
            }
            None => false,
        }
    }

    /// Changes recorded so far.
    pub fn changes(&self) -> &[ModelChange] {
        &self.changes
    }
}

impl Deref for ModelWriteGuard {
    type Target = MemoryModel;

    fn deref(&self) -> &MemoryModel {
        &self.guard
    }
}

impl Drop for ModelWriteGuard {
    fn drop(&mut self) {
        if self.changes.is_empty() {
            return;
        }

        let set = ChangeSet {
            sequence: self.guard.sequence(),
            changes: std::mem::take(&mut self.changes),
        };
        debug!(
            sequence = set.sequence,
            count = set.changes.len(),
            "Publishing object model changes"
        );
        // No receivers just means nobody is connected
        let _ = self.changes_tx.send(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> Vec<PathElement> {
        vec![PathElement::name("state"), PathElement::name("status")]
    }

    #[tokio::test]
    async fn test_write_publishes_changes_once() {
        let provider = ModelProvider::default();
        let mut changes_rx = provider.subscribe();

        {
            let mut model = provider.write().await;
            model.set(&status(), "busy").unwrap();
            model.set_global("enableBroadcast", true).unwrap();
            assert_eq!(model.changes().len(), 2);
        }

        let set = changes_rx.recv().await.unwrap();
        assert_eq!(set.sequence, 2);
        let paths: Vec<String> = set.changes.iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["state.status", "global.enableBroadcast"]);
        assert!(changes_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_or_empty_writes_publish_nothing() {
        let provider = ModelProvider::default();
        let mut changes_rx = provider.subscribe();

        {
            let mut model = provider.write().await;
            assert!(model.set(&[PathElement::name("nope")], 1i64).is_err());
            assert!(!model.remove_global("missing"));
        }

        assert!(changes_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_readers_see_written_values() {
        let provider = ModelProvider::new(MemoryModel::default(), Duration::from_millis(50));

        provider.write().await.set(&status(), "idle").unwrap();

        let model = provider.read().await;
        assert_eq!(model.get(&status()), Some(&ModelNode::from("idle")));
        assert_eq!(model.sequence(), 1);
    }
}
