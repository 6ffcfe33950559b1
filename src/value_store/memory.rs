//! In-memory ValueStore
//!
//! Default backend for tests and ephemeral runs. Keeps the object tree
//! and states in two maps behind a single RwLock.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ObjectKind, ObjectMeta, StateValue, StoredState, ValueStore};
use crate::Result;

#[derive(Debug, Clone)]
struct StoredObject {
    kind: ObjectKind,
    #[allow(dead_code)]
    meta: ObjectMeta,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    states: HashMap<String, StoredState>,
}

/// Memory-backed store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states (test helper)
    pub async fn state_count(&self) -> usize {
        self.inner.read().await.states.len()
    }
}

#[async_trait]
impl ValueStore for MemoryStore {
    async fn get_state(&self, name: &str) -> Result<Option<StoredState>> {
        Ok(self.inner.read().await.states.get(name).cloned())
    }

    async fn set_state(&self, name: &str, value: StateValue, ack: bool) -> Result<()> {
        self.inner
            .write()
            .await
            .states
            .insert(name.to_string(), StoredState { value, ack });
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().await.objects.contains_key(name))
    }

    async fn create_object(&self, name: &str, kind: ObjectKind, meta: ObjectMeta) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .objects
            .entry(name.to_string())
            .or_insert(StoredObject { kind, meta });
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let subtree = format!("{}.", name);
        inner
            .objects
            .retain(|path, _| path != name && !path.starts_with(&subtree));
        inner
            .states
            .retain(|path, _| path != name && !path.starts_with(&subtree));
        Ok(())
    }

    async fn list_channels(&self, prefix: &str) -> Result<Vec<String>> {
        let subtree = format!("{}.", prefix);
        let mut channels: Vec<String> = self
            .inner
            .read()
            .await
            .objects
            .iter()
            .filter(|(path, obj)| obj.kind == ObjectKind::Channel && path.starts_with(&subtree))
            .map(|(path, _)| path.clone())
            .collect();
        channels.sort();
        Ok(channels)
    }
}
