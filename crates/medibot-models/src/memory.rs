//! In-memory storage collaborators.
//!
//! The production deployment fronts managed key-value and blob services; the
//! backend only ever talks to them through the `KeyValueStore` and
//! `ObjectStore` traits. These in-memory implementations back tests and the
//! CLI's offline mode.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use medibot_abstraction::{KeyValueStore, ObjectStore, StoreError};

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let items = self.items.read().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    async fn put(&self, key: &str, item: serde_json::Value) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|e| StoreError::Io(e.to_string()))?;
        items.insert(key.to_string(), item);
        Ok(())
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored bytes for `key`, if present.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().ok().and_then(|m| m.get(key).cloned())
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().map_err(|e| StoreError::Io(e.to_string()))?;
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn presign(&self, key: &str, ttl_seconds: u64) -> Result<String, StoreError> {
        let objects = self.objects.read().map_err(|e| StoreError::Io(e.to_string()))?;
        if !objects.contains_key(key) {
            return Err(StoreError::Io(format!("no such object: {}", key)));
        }
        Ok(format!("memory://objects/{}?expires_in={}", key, ttl_seconds))
    }
}
