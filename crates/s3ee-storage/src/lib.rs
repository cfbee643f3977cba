//! s3ee-storage: the object store contract used by the encryption client
//!
//! The client only needs `put`, `get` and `delete` on `(bucket, key)` pairs with
//! user metadata; errors are plain `opendal::Error`s so callers see backend
//! failures unchanged.

pub mod memory;
pub mod operator;
pub mod store;

pub use memory::MemoryStore;
pub use operator::{build_operator, OpendalStore, StorageConfig};
pub use store::{ObjectLocation, ObjectStore, PutObject, StoredObject};
