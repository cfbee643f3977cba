//! EncryptionClient: envelope-encrypted put/get/delete over an [`ObjectStore`]

use std::sync::Arc;

use s3ee_core::config::{EncryptionConfig, StorageConfig as CoreStorageConfig};
use s3ee_core::{EnvelopeLocation, S3eeError, S3eeResult, DEFAULT_INSTRUCTION_SUFFIX};
use s3ee_crypto::codec::INSTRUCTION_MARKER;
use s3ee_crypto::{DefaultKeyProvider, KeyProvider, MasterKey};
use s3ee_storage::{ObjectLocation, ObjectStore, OpendalStore, StorageConfig};

use crate::pipeline::{EncryptionPipeline, Placement};
use crate::request::{GetObjectInput, GetObjectOutput, PutObjectInput, PutObjectOutput};

/// Client-side encrypting wrapper around an object store.
///
/// Cheap to clone; clones share the key provider and store. Every call is
/// independent and makes one or two store round trips.
///
/// In [`EnvelopeLocation::InstructionFile`] mode a write is two puts
/// (ciphertext, then instruction object) and a read is two gets. These pairs
/// are not transactional: a reader racing a writer on the same key may pair a
/// body with the envelope of another write and fail to decrypt. Serialize
/// overwrites and reads of one key externally when that matters.
#[derive(Clone)]
pub struct EncryptionClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pipeline: EncryptionPipeline,
    envelope_location: EnvelopeLocation,
    instruction_file_suffix: String,
}

impl std::fmt::Debug for EncryptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionClient")
            .field("envelope_location", &self.inner.envelope_location)
            .field("instruction_file_suffix", &self.inner.instruction_file_suffix)
            .finish_non_exhaustive()
    }
}

impl EncryptionClient {
    pub fn builder() -> EncryptionClientBuilder {
        EncryptionClientBuilder::default()
    }

    pub fn envelope_location(&self) -> EnvelopeLocation {
        self.inner.envelope_location
    }

    pub fn instruction_file_suffix(&self) -> &str {
        &self.inner.instruction_file_suffix
    }

    pub fn key_provider(&self) -> &Arc<dyn KeyProvider> {
        self.inner.pipeline.provider()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.inner.pipeline.store()
    }

    pub fn pipeline(&self) -> &EncryptionPipeline {
        &self.inner.pipeline
    }

    fn default_placement(&self) -> Placement {
        Placement::resolve(
            self.inner.envelope_location,
            &self.inner.instruction_file_suffix,
            None,
            None,
        )
    }

    /// Encrypt and upload an object, attaching its envelope at the client's
    /// configured location.
    pub async fn put_object(&self, input: PutObjectInput) -> S3eeResult<PutObjectOutput> {
        tracing::debug!(bucket = %input.bucket, key = %input.key, bytes = input.body.len(), "put_object");
        self.inner
            .pipeline
            .write(input, &self.default_placement())
            .await
    }

    /// Download and decrypt an object.
    ///
    /// A byte range is rejected with [`S3eeError::RangeNotSupported`] before
    /// the store is contacted.
    pub async fn get_object(&self, input: GetObjectInput) -> S3eeResult<GetObjectOutput> {
        if let Some(range) = &input.range {
            tracing::debug!(bucket = %input.bucket, key = %input.key, %range, "rejecting ranged get");
            return Err(S3eeError::RangeNotSupported);
        }
        if input.instruction_file_suffix.as_deref() == Some("") {
            return Err(S3eeError::config("instruction_file_suffix must not be empty"));
        }

        let placement = Placement::resolve(
            self.inner.envelope_location,
            &self.inner.instruction_file_suffix,
            input.envelope_location,
            input.instruction_file_suffix.as_deref(),
        );
        tracing::debug!(
            bucket = %input.bucket,
            key = %input.key,
            envelope_location = %placement.location,
            "get_object"
        );

        self.inner.pipeline.read(&input.location(), &placement).await
    }

    /// Delete an object and its instruction object at the configured suffix.
    ///
    /// The sibling is only deleted when it carries the instruction marker, so
    /// an unrelated object that happens to share the name is left alone. A
    /// missing instruction object is not an error.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> S3eeResult<()> {
        let location = ObjectLocation::new(bucket, key);
        let store = self.store();

        store.delete(&location).await?;

        let instruction = location.with_suffix(&self.inner.instruction_file_suffix);
        match store.get(&instruction).await.map_err(S3eeError::from) {
            Ok(sibling) if sibling.metadata.contains_key(INSTRUCTION_MARKER) => {
                store.delete(&instruction).await?;
                tracing::debug!(instruction = %instruction, "deleted instruction object");
            }
            Ok(_) => {
                tracing::debug!(instruction = %instruction, "sibling is not an instruction object, keeping it");
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(instruction = %instruction, "no instruction object to delete");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(object = %location, "deleted object");
        Ok(())
    }
}

/// Builder for [`EncryptionClient`]. All validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct EncryptionClientBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    encryption_key: Option<MasterKey>,
    envelope_location: Option<String>,
    instruction_file_suffix: Option<String>,
}

impl EncryptionClientBuilder {
    /// Object store to wrap. Defaults to an S3 store built from the default
    /// storage settings and `AWS_*` credentials.
    pub fn client(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Single master key, used through a [`DefaultKeyProvider`].
    pub fn encryption_key(mut self, key: MasterKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// `"metadata"` (default) or `"instruction_file"`.
    pub fn envelope_location(mut self, location: impl Into<String>) -> Self {
        self.envelope_location = Some(location.into());
        self
    }

    pub fn instruction_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.instruction_file_suffix = Some(suffix.into());
        self
    }

    /// Take location and suffix from an `[encryption]` config section.
    pub fn from_config(self, config: &EncryptionConfig) -> Self {
        self.envelope_location(config.envelope_location.clone())
            .instruction_file_suffix(config.instruction_file_suffix.clone())
    }

    pub fn build(self) -> S3eeResult<EncryptionClient> {
        let provider: Arc<dyn KeyProvider> = match (self.key_provider, self.encryption_key) {
            (Some(provider), None) => provider,
            (None, Some(key)) => Arc::new(DefaultKeyProvider::new(key)),
            (Some(_), Some(_)) => {
                return Err(S3eeError::config(
                    "set either key_provider or encryption_key, not both",
                ))
            }
            (None, None) => {
                return Err(S3eeError::config(
                    "one of key_provider or encryption_key is required",
                ))
            }
        };

        let envelope_location = match self.envelope_location {
            Some(location) => location.parse()?,
            None => EnvelopeLocation::default(),
        };

        let instruction_file_suffix = self
            .instruction_file_suffix
            .unwrap_or_else(|| DEFAULT_INSTRUCTION_SUFFIX.to_string());
        if instruction_file_suffix.is_empty() {
            return Err(S3eeError::config("instruction_file_suffix must not be empty"));
        }

        let store = match self.store {
            Some(store) => store,
            None => {
                let cfg = StorageConfig::from_env(&CoreStorageConfig::default())?;
                tracing::debug!(endpoint = %cfg.endpoint, "no store given, using default S3 store");
                Arc::new(OpendalStore::new(cfg))
            }
        };

        tracing::debug!(
            envelope_location = %envelope_location,
            suffix = %instruction_file_suffix,
            "built encryption client"
        );

        Ok(EncryptionClient {
            inner: Arc::new(ClientInner {
                pipeline: EncryptionPipeline::new(provider, store),
                envelope_location,
                instruction_file_suffix,
            }),
        })
    }
}
