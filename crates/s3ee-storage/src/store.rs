//! Object store contract

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Address of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Sibling object in the same bucket at `key + suffix`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: format!("{}{suffix}", self.key),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A write request: body plus user metadata.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub location: ObjectLocation,
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
}

/// A fetched object.
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
}

/// Minimal object store used by the encryption client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object: PutObject) -> opendal::Result<()>;

    /// Fetch body and metadata. A missing object is `ErrorKind::NotFound`.
    async fn get(&self, location: &ObjectLocation) -> opendal::Result<StoredObject>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, location: &ObjectLocation) -> opendal::Result<()>;
}
