//! Envelope data model
//!
//! An [`Envelope`] is everything needed, besides the master key, to decrypt one
//! object: the wrapped content key, the body nonce, the content algorithm and the
//! materials description that names the master key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use s3ee_core::S3eeError;
use serde::{Deserialize, Serialize};

use crate::master::MasterKey;
use crate::NONCE_SIZE;

/// Immutable string-to-string description of the master key used for a write.
///
/// The canonical form is compact JSON with keys in sorted order (`{}` when
/// empty), so equal descriptions always serialize to equal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialsDescription(BTreeMap<String, String>);

impl MaterialsDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_canonical_string(&self) -> String {
        // BTreeMap<String, String> always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse the canonical form. Anything other than a flat JSON object of
    /// strings is a malformed envelope.
    pub fn parse(s: &str) -> Result<Self, S3eeError> {
        serde_json::from_str::<BTreeMap<String, String>>(s)
            .map(Self)
            .map_err(|e| S3eeError::malformed(format!("materials description {s:?}: {e}")))
    }
}

impl fmt::Display for MaterialsDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for MaterialsDescription {
    type Err = S3eeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MaterialsDescription {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The master key selected for one write, and the description stored with it.
#[derive(Debug, Clone)]
pub struct EncryptionMaterials {
    pub description: MaterialsDescription,
    pub master_key: MasterKey,
}

impl EncryptionMaterials {
    pub fn new(description: MaterialsDescription, master_key: MasterKey) -> Self {
        Self {
            description,
            master_key,
        }
    }
}

/// Per-object envelope. Created fresh for every write, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub wrapped_key: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub algorithm: String,
    pub description: MaterialsDescription,
}
