//! Encrypt-on-write / decrypt-on-read around the object store
//!
//! Write: materials → fresh content key + nonce → encrypt body → wrap key →
//! envelope → put ciphertext (→ put instruction object).
//!
//! Read: get ciphertext (→ get instruction object) → parse envelope →
//! resolve master key → unwrap → decrypt.
//!
//! In instruction-object mode the two puts are not atomic. The ciphertext is
//! always written first; if the instruction put then fails the error is
//! returned and the pair is left inconsistent. Concurrent writers and readers of
//! the same key can observe an envelope from a different write than the body.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use s3ee_core::{EnvelopeLocation, S3eeError, S3eeResult};
use s3ee_crypto::codec::{ENVELOPE_FIELDS, INSTRUCTION_MARKER};
use s3ee_crypto::{
    decrypt_body, encrypt_body, generate_content_key, generate_nonce, Envelope, EnvelopeCodec,
    KeyProvider, CONTENT_ALGORITHM,
};
use s3ee_storage::{ObjectLocation, ObjectStore, PutObject};

use crate::request::{GetObjectOutput, PutObjectInput, PutObjectOutput};

/// Where an envelope lives for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub location: EnvelopeLocation,
    pub suffix: String,
}

impl Placement {
    /// Per-call suffix beats per-call location, which beats the defaults.
    pub fn resolve(
        default_location: EnvelopeLocation,
        default_suffix: &str,
        location_override: Option<EnvelopeLocation>,
        suffix_override: Option<&str>,
    ) -> Self {
        match suffix_override {
            Some(suffix) => Self {
                location: EnvelopeLocation::InstructionFile,
                suffix: suffix.to_string(),
            },
            None => Self {
                location: location_override.unwrap_or(default_location),
                suffix: default_suffix.to_string(),
            },
        }
    }

    pub fn instruction_location(&self, object: &ObjectLocation) -> Option<ObjectLocation> {
        match self.location {
            EnvelopeLocation::Metadata => None,
            EnvelopeLocation::InstructionFile => Some(object.with_suffix(&self.suffix)),
        }
    }
}

/// Ciphertext and envelope for one body.
#[derive(Debug, Clone)]
pub struct SealedBody {
    pub ciphertext: Bytes,
    pub envelope: Envelope,
    pub key_fingerprint: String,
}

/// Stateless orchestration over a shared key provider and store.
#[derive(Clone)]
pub struct EncryptionPipeline {
    provider: Arc<dyn KeyProvider>,
    store: Arc<dyn ObjectStore>,
}

impl EncryptionPipeline {
    pub fn new(provider: Arc<dyn KeyProvider>, store: Arc<dyn ObjectStore>) -> Self {
        Self { provider, store }
    }

    pub fn provider(&self) -> &Arc<dyn KeyProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Encrypt `plaintext` under a fresh content key wrapped by the current master key.
    pub fn seal(&self, plaintext: &[u8]) -> S3eeResult<SealedBody> {
        let materials = self.provider.encryption_materials()?;

        let content_key = generate_content_key().map_err(S3eeError::crypto)?;
        let nonce = generate_nonce().map_err(S3eeError::crypto)?;

        let ciphertext = encrypt_body(&content_key, &nonce, plaintext).map_err(S3eeError::crypto)?;
        let wrapped_key = materials
            .master_key
            .wrap_content_key(&content_key)
            .map_err(S3eeError::crypto)?;

        tracing::debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            key_kind = materials.master_key.kind(),
            "sealed body"
        );

        Ok(SealedBody {
            ciphertext: Bytes::from(ciphertext),
            envelope: Envelope {
                wrapped_key,
                nonce,
                algorithm: CONTENT_ALGORITHM.to_string(),
                description: materials.description,
            },
            key_fingerprint: materials.master_key.fingerprint(),
        })
    }

    /// Decrypt a body with its envelope. No plaintext is returned on any failure.
    pub fn open(&self, envelope: &Envelope, ciphertext: &[u8]) -> S3eeResult<Vec<u8>> {
        let master_key = self.provider.key_for(&envelope.description)?;
        tracing::debug!(
            description = %envelope.description,
            fingerprint = %master_key.fingerprint(),
            "resolved master key"
        );

        let content_key = master_key
            .unwrap_content_key(&envelope.wrapped_key)
            .map_err(S3eeError::crypto)?;
        decrypt_body(&content_key, &envelope.nonce, ciphertext).map_err(S3eeError::crypto)
    }

    /// Seal and upload. Ciphertext is written before the instruction object.
    pub async fn write(
        &self,
        input: PutObjectInput,
        placement: &Placement,
    ) -> S3eeResult<PutObjectOutput> {
        let location = input.location();
        let sealed = self.seal(&input.body)?;

        let mut metadata = input.metadata;
        strip_reserved(&mut metadata, &location);
        if placement.location == EnvelopeLocation::Metadata {
            metadata.extend(EnvelopeCodec::to_metadata(&sealed.envelope));
        }

        let ciphertext_len = sealed.ciphertext.len() as u64;
        self.store
            .put(PutObject {
                location: location.clone(),
                body: sealed.ciphertext,
                metadata,
                content_type: input.content_type,
            })
            .await?;
        tracing::debug!(object = %location, "stored ciphertext object");

        let instruction = placement.instruction_location(&location);
        if let Some(instruction_location) = &instruction {
            let document = EnvelopeCodec::to_instruction(&sealed.envelope)?;
            let put = self
                .store
                .put(PutObject {
                    location: instruction_location.clone(),
                    body: Bytes::from(document),
                    metadata: HashMap::from([(INSTRUCTION_MARKER.to_string(), String::new())]),
                    content_type: Some("application/json".to_string()),
                })
                .await;
            if let Err(e) = put {
                tracing::error!(
                    object = %location,
                    instruction = %instruction_location,
                    "ciphertext stored but instruction object write failed; object is unreadable until rewritten"
                );
                return Err(e.into());
            }
            tracing::debug!(instruction = %instruction_location, "stored instruction object");
        }

        tracing::info!(
            object = %location,
            envelope_location = %placement.location,
            fingerprint = %sealed.key_fingerprint,
            "encrypted put complete"
        );

        Ok(PutObjectOutput {
            location,
            envelope_location: placement.location,
            instruction,
            algorithm: sealed.envelope.algorithm,
            description: sealed.envelope.description,
            ciphertext_len,
        })
    }

    /// Download, resolve the envelope and decrypt.
    pub async fn read(
        &self,
        location: &ObjectLocation,
        placement: &Placement,
    ) -> S3eeResult<GetObjectOutput> {
        let object = self.store.get(location).await?;

        let envelope = match placement.instruction_location(location) {
            None => EnvelopeCodec::from_metadata(&object.metadata)?,
            Some(instruction_location) => {
                let instruction = self.store.get(&instruction_location).await?;
                tracing::debug!(instruction = %instruction_location, "fetched instruction object");
                EnvelopeCodec::from_instruction(&instruction.body)?
            }
        };

        let plaintext = self.open(&envelope, &object.body)?;

        let mut metadata = object.metadata;
        EnvelopeCodec::strip(&mut metadata);

        tracing::info!(
            object = %location,
            envelope_location = %placement.location,
            bytes = plaintext.len(),
            "decrypted get complete"
        );

        Ok(GetObjectOutput {
            body: Bytes::from(plaintext),
            metadata,
            content_type: object.content_type,
            envelope,
        })
    }
}

/// Drop caller metadata entries that collide with envelope field names.
fn strip_reserved(metadata: &mut HashMap<String, String>, location: &ObjectLocation) {
    for field in ENVELOPE_FIELDS {
        if metadata.remove(field).is_some() {
            tracing::warn!(object = %location, field, "dropping caller metadata entry reserved for the envelope");
        }
    }
}
