//! Master key resolution
//!
//! A [`KeyProvider`] picks the master key for each new write and finds the
//! master key again, from the stored materials description, on read.

use std::collections::HashMap;
use std::sync::RwLock;

use s3ee_core::{S3eeError, S3eeResult};

use crate::envelope::{EncryptionMaterials, MaterialsDescription};
use crate::master::MasterKey;

/// Description entry naming the master key in a [`RotatingKeyProvider`].
pub const KEY_NAME_FIELD: &str = "key";

/// Resolves master keys for writes and reads.
///
/// Implementations are shared between concurrent requests.
pub trait KeyProvider: Send + Sync {
    /// Materials for a new write. Fails only when the provider is unconfigured.
    fn encryption_materials(&self) -> S3eeResult<EncryptionMaterials>;

    /// Master key matching a stored description, or `S3eeError::KeyNotFound`.
    fn key_for(&self, description: &MaterialsDescription) -> S3eeResult<MasterKey>;
}

/// Provider around a single fixed master key.
#[derive(Debug, Clone)]
pub struct DefaultKeyProvider {
    materials: EncryptionMaterials,
}

impl DefaultKeyProvider {
    /// Use `key` for every write, with an empty description.
    pub fn new(key: MasterKey) -> Self {
        Self::with_description(key, MaterialsDescription::new())
    }

    pub fn with_description(key: MasterKey, description: MaterialsDescription) -> Self {
        Self {
            materials: EncryptionMaterials::new(description, key),
        }
    }
}

impl KeyProvider for DefaultKeyProvider {
    fn encryption_materials(&self) -> S3eeResult<EncryptionMaterials> {
        Ok(self.materials.clone())
    }

    fn key_for(&self, description: &MaterialsDescription) -> S3eeResult<MasterKey> {
        if *description == self.materials.description {
            Ok(self.materials.master_key.clone())
        } else {
            Err(S3eeError::KeyNotFound(description.to_canonical_string()))
        }
    }
}

#[derive(Debug, Default)]
struct Keyring {
    keys: HashMap<String, MasterKey>,
    current: Option<String>,
}

/// Provider holding named master keys, one of which is current for writes.
///
/// New writes are described as `{"key": "<current name>"}`; reads look the
/// name up again, so objects written under a retired key stay readable for as
/// long as that key remains registered.
#[derive(Debug, Default)]
pub struct RotatingKeyProvider {
    ring: RwLock<Keyring>,
}

impl RotatingKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a named key.
    pub fn with_key(self, name: impl Into<String>, key: MasterKey) -> Self {
        self.add_key(name, key);
        self
    }

    /// Builder-style selection of the current key. The name must be registered.
    pub fn with_current(self, name: &str) -> S3eeResult<Self> {
        self.rotate_to(name)?;
        Ok(self)
    }

    /// Register (or replace) a named key.
    pub fn add_key(&self, name: impl Into<String>, key: MasterKey) {
        let name = name.into();
        tracing::debug!(key_name = %name, fingerprint = %key.fingerprint(), "registering master key");
        self.write_ring().keys.insert(name, key);
    }

    /// Switch the key used for new writes. Existing objects are unaffected.
    pub fn rotate_to(&self, name: &str) -> S3eeResult<()> {
        let mut ring = self.write_ring();
        if !ring.keys.contains_key(name) {
            return Err(S3eeError::config(format!(
                "cannot rotate to unknown master key {name:?}"
            )));
        }
        tracing::info!(key_name = %name, previous = ?ring.current, "rotating current master key");
        ring.current = Some(name.to_string());
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.read_ring().current.clone()
    }

    pub fn key_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_ring().keys.keys().cloned().collect();
        names.sort();
        names
    }

    fn read_ring(&self) -> std::sync::RwLockReadGuard<'_, Keyring> {
        self.ring.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_ring(&self) -> std::sync::RwLockWriteGuard<'_, Keyring> {
        self.ring.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyProvider for RotatingKeyProvider {
    fn encryption_materials(&self) -> S3eeResult<EncryptionMaterials> {
        let ring = self.read_ring();
        let name = ring
            .current
            .as_deref()
            .ok_or_else(|| S3eeError::config("key provider has no current master key"))?;
        let key = ring.keys.get(name).ok_or_else(|| {
            S3eeError::config(format!("current master key {name:?} is not registered"))
        })?;

        Ok(EncryptionMaterials::new(
            MaterialsDescription::new().with(KEY_NAME_FIELD, name),
            key.clone(),
        ))
    }

    fn key_for(&self, description: &MaterialsDescription) -> S3eeResult<MasterKey> {
        description
            .get(KEY_NAME_FIELD)
            .and_then(|name| self.read_ring().keys.get(name).cloned())
            .ok_or_else(|| S3eeError::KeyNotFound(description.to_canonical_string()))
    }
}
