//! Object store port and the in-memory implementation.

use crate::uri::ObjectUri;
use async_trait::async_trait;
use cachet_core::{Error, ItemReader, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Listing record for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub uri: ObjectUri,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Operations the store backend needs from an object storage service.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check if an object exists.
    async fn exists(&self, uri: &ObjectUri) -> Result<bool>;

    /// Open a stream over an object's contents.
    async fn get(&self, uri: &ObjectUri) -> Result<ItemReader>;

    /// Store an object, replacing any existing one.
    async fn put(&self, uri: &ObjectUri, body: Vec<u8>) -> Result<()>;

    /// Server-side copy of `src` to `dst`.
    async fn copy(&self, src: &ObjectUri, dst: &ObjectUri) -> Result<()>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, uri: &ObjectUri) -> Result<()>;

    /// Delete every object whose key starts with `prefix`'s key.
    /// Returns the number of objects deleted.
    async fn delete_prefix(&self, prefix: &ObjectUri) -> Result<u64>;

    /// List every object whose key starts with `prefix`'s key.
    async fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectMeta>>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// In-process object store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectUri, StoredObject>>,
    calls: AtomicU64,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations performed so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of objects currently stored.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, uri: &ObjectUri) -> Result<bool> {
        self.record_call();
        Ok(self.objects.read().await.contains_key(uri))
    }

    async fn get(&self, uri: &ObjectUri) -> Result<ItemReader> {
        self.record_call();
        let objects = self.objects.read().await;
        let object = objects
            .get(uri)
            .ok_or_else(|| Error::NotFound(uri.to_string()))?;
        Ok(Box::pin(std::io::Cursor::new(object.body.clone())))
    }

    async fn put(&self, uri: &ObjectUri, body: Vec<u8>) -> Result<()> {
        self.record_call();
        self.objects.write().await.insert(
            uri.clone(),
            StoredObject {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn copy(&self, src: &ObjectUri, dst: &ObjectUri) -> Result<()> {
        self.record_call();
        let mut objects = self.objects.write().await;
        let body = objects
            .get(src)
            .map(|object| object.body.clone())
            .ok_or_else(|| Error::Storage(format!("copy source does not exist: {}", src)))?;
        objects.insert(
            dst.clone(),
            StoredObject {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, uri: &ObjectUri) -> Result<()> {
        self.record_call();
        self.objects.write().await.remove(uri);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &ObjectUri) -> Result<u64> {
        self.record_call();
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|uri, _| !uri.has_prefix(prefix));
        Ok((before - objects.len()) as u64)
    }

    async fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectMeta>> {
        self.record_call();
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|(uri, _)| uri.has_prefix(prefix))
            .map(|(uri, object)| ObjectMeta {
                uri: uri.clone(),
                size_bytes: object.body.len() as u64,
                last_modified: object.last_modified,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
