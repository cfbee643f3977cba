//! s3ee-client: client-side envelope encryption for object stores
//!
//! [`EncryptionClient`] wraps an [`ObjectStore`]: `put_object` seals the body
//! under a fresh content key before upload, `get_object` fetches the envelope,
//! resolves the master key through the configured [`KeyProvider`] and decrypts.
//! Plaintext and key material never leave the process.

pub mod client;
pub mod pipeline;
pub mod request;

pub use client::{EncryptionClient, EncryptionClientBuilder};
pub use pipeline::{EncryptionPipeline, Placement, SealedBody};
pub use request::{GetObjectInput, GetObjectOutput, PutObjectInput, PutObjectOutput};

pub use s3ee_core::{EnvelopeLocation, S3eeError, S3eeResult, DEFAULT_INSTRUCTION_SUFFIX};
pub use s3ee_crypto::{
    AgeKeyPair, DefaultKeyProvider, Envelope, KeyProvider, MasterKey, MaterialsDescription,
    RotatingKeyProvider,
};
pub use s3ee_storage::{MemoryStore, ObjectLocation, ObjectStore, OpendalStore};
