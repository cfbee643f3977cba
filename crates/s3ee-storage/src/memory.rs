//! In-process object store
//!
//! Keeps objects in a map and counts every request, which makes it useful for
//! local runs and for asserting how many store round trips an operation made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{ObjectLocation, ObjectStore, PutObject, StoredObject};

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectLocation, StoredObject>>,
    requests: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put`/`get`/`delete` calls served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Read an object without counting a request.
    pub async fn peek(&self, location: &ObjectLocation) -> Option<StoredObject> {
        self.objects.read().await.get(location).cloned()
    }

    /// Replace an object without counting a request.
    pub async fn insert(&self, location: ObjectLocation, object: StoredObject) {
        self.objects.write().await.insert(location, object);
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, object: PutObject) -> opendal::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let stored = StoredObject {
            body: object.body,
            metadata: object.metadata,
            content_type: object.content_type,
        };
        self.objects.write().await.insert(object.location, stored);
        Ok(())
    }

    async fn get(&self, location: &ObjectLocation) -> opendal::Result<StoredObject> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| {
                opendal::Error::new(
                    opendal::ErrorKind::NotFound,
                    format!("object {location} not found"),
                )
            })
    }

    async fn delete(&self, location: &ObjectLocation) -> opendal::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.objects.write().await.remove(location);
        Ok(())
    }
}
