//! Request and response types for the encryption client

use std::collections::HashMap;

use bytes::Bytes;
use s3ee_core::EnvelopeLocation;
use s3ee_crypto::{Envelope, MaterialsDescription};
use s3ee_storage::ObjectLocation;

/// Upload request. Everything except the body is forwarded to the store as-is.
#[derive(Debug, Clone)]
pub struct PutObjectInput {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    /// Caller metadata, stored unencrypted alongside the ciphertext
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
}

impl PutObjectInput {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: body.into(),
            metadata: HashMap::new(),
            content_type: None,
        }
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(&self.bucket, &self.key)
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct PutObjectOutput {
    pub location: ObjectLocation,
    pub envelope_location: EnvelopeLocation,
    /// Set when the envelope went to an instruction object
    pub instruction: Option<ObjectLocation>,
    pub algorithm: String,
    pub description: MaterialsDescription,
    /// Size of the stored ciphertext in bytes
    pub ciphertext_len: u64,
}

/// Download request with optional per-call envelope overrides.
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    pub bucket: String,
    pub key: String,
    /// Byte-range selector (e.g. `bytes=0-99`); always rejected
    pub range: Option<String>,
    pub envelope_location: Option<EnvelopeLocation>,
    /// Implies `EnvelopeLocation::InstructionFile` when set
    pub instruction_file_suffix: Option<String>,
}

impl GetObjectInput {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn envelope_location(mut self, location: EnvelopeLocation) -> Self {
        self.envelope_location = Some(location);
        self
    }

    pub fn instruction_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.instruction_file_suffix = Some(suffix.into());
        self
    }

    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(&self.bucket, &self.key)
    }
}

/// Decrypted object.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    pub body: Bytes,
    /// Caller metadata, without the embedded envelope entries
    pub metadata: HashMap<String, String>,
    pub content_type: Option<String>,
    pub envelope: Envelope,
}
