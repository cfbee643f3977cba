//! Master keys and content-key wrapping
//!
//! Wrapped content key formats:
//! - Symmetric: AES-256-SIV over the 32-byte content key, `[16-byte SIV][32-byte ciphertext]`.
//!   The 512-bit SIV key is HKDF-SHA256 expanded from the master key (info = "s3ee-key-wrap").
//! - Age: a binary age file with one X25519 stanza, encrypting the 32-byte content key.

use std::io::{Read, Write};
use std::sync::Arc;

use aes_siv::{
    aead::{Aead, KeyInit, Payload},
    Aes256SivAead, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::keys::ContentKey;
use crate::{KEY_SIZE, TAG_SIZE};

const WRAP_INFO: &[u8] = b"s3ee-key-wrap";
const WRAP_AAD: &[u8] = b"s3ee-content-key-v1";
const FINGERPRINT_CONTEXT: &str = "s3ee 2026 master key fingerprint";

/// A 256-bit symmetric master key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An age X25519 key pair. The identity is optional: a recipient-only key
/// can wrap content keys for new writes but cannot unwrap them.
#[derive(Clone)]
pub struct AgeKeyPair {
    recipient: age::x25519::Recipient,
    identity: Option<Arc<age::x25519::Identity>>,
}

impl AgeKeyPair {
    pub fn generate() -> Self {
        Self::from_identity(age::x25519::Identity::generate())
    }

    pub fn from_identity(identity: age::x25519::Identity) -> Self {
        Self {
            recipient: identity.to_public(),
            identity: Some(Arc::new(identity)),
        }
    }

    pub fn from_recipient(recipient: age::x25519::Recipient) -> Self {
        Self {
            recipient,
            identity: None,
        }
    }

    pub fn recipient(&self) -> &age::x25519::Recipient {
        &self.recipient
    }

    pub fn identity(&self) -> Option<&age::x25519::Identity> {
        self.identity.as_deref()
    }

    /// Drop the private half, keeping a key that can only wrap.
    pub fn public_only(&self) -> Self {
        Self::from_recipient(self.recipient.clone())
    }
}

impl std::fmt::Debug for AgeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgeKeyPair")
            .field("recipient", &self.recipient.to_string())
            .field("identity", &self.identity.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Long-lived key that wraps and unwraps per-object content keys.
#[derive(Clone, Debug)]
pub enum MasterKey {
    Symmetric(SymmetricKey),
    Age(AgeKeyPair),
}

impl MasterKey {
    pub fn symmetric(bytes: [u8; KEY_SIZE]) -> Self {
        Self::Symmetric(SymmetricKey::from_bytes(bytes))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Symmetric(_) => "symmetric",
            Self::Age(_) => "age",
        }
    }

    /// Short public identifier, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
        match self {
            Self::Symmetric(key) => hasher.update(key.as_bytes()),
            Self::Age(pair) => hasher.update(pair.recipient.to_string().as_bytes()),
        };
        hasher.finalize().to_hex()[..16].to_string()
    }

    /// True if this key can recover content keys (not a recipient-only age key).
    pub fn can_unwrap(&self) -> bool {
        match self {
            Self::Symmetric(_) => true,
            Self::Age(pair) => pair.identity.is_some(),
        }
    }

    /// Wrap (encrypt) a content key under this master key.
    pub fn wrap_content_key(&self, content_key: &ContentKey) -> anyhow::Result<Vec<u8>> {
        match self {
            Self::Symmetric(key) => siv_wrap(key, content_key),
            Self::Age(pair) => age_wrap(pair, content_key),
        }
    }

    /// Unwrap (decrypt) a content key produced by [`MasterKey::wrap_content_key`].
    pub fn unwrap_content_key(&self, wrapped: &[u8]) -> anyhow::Result<ContentKey> {
        match self {
            Self::Symmetric(key) => siv_unwrap(key, wrapped),
            Self::Age(pair) => age_unwrap(pair, wrapped),
        }
    }
}

fn siv_cipher(key: &SymmetricKey) -> anyhow::Result<Aes256SivAead> {
    // AES-256-SIV requires a 64-byte key (two 32-byte sub-keys)
    let mut double_key = [0u8; 64];
    Hkdf::<Sha256>::new(None, key.as_bytes())
        .expand(WRAP_INFO, &mut double_key)
        .map_err(|e| anyhow::anyhow!("HKDF expand for AES-SIV: {e}"))?;
    let cipher = Aes256SivAead::new((&double_key).into());
    double_key.zeroize();
    Ok(cipher)
}

fn siv_wrap(key: &SymmetricKey, content_key: &ContentKey) -> anyhow::Result<Vec<u8>> {
    let cipher = siv_cipher(key)?;
    cipher
        .encrypt(
            &Nonce::default(),
            Payload {
                msg: content_key.as_bytes(),
                aad: WRAP_AAD,
            },
        )
        .map_err(|e| anyhow::anyhow!("key wrapping failed: {e}"))
}

fn siv_unwrap(key: &SymmetricKey, wrapped: &[u8]) -> anyhow::Result<ContentKey> {
    if wrapped.len() != KEY_SIZE + TAG_SIZE {
        anyhow::bail!(
            "wrapped key has wrong size: {} bytes (expected {})",
            wrapped.len(),
            KEY_SIZE + TAG_SIZE
        );
    }

    let cipher = siv_cipher(key)?;
    let mut plaintext = cipher
        .decrypt(
            &Nonce::default(),
            Payload {
                msg: wrapped,
                aad: WRAP_AAD,
            },
        )
        .map_err(|_| {
            anyhow::anyhow!("key unwrapping failed: wrong master key or corrupted data")
        })?;

    let key = ContentKey::from_slice(&plaintext);
    plaintext.zeroize();
    key
}

fn age_wrap(pair: &AgeKeyPair, content_key: &ContentKey) -> anyhow::Result<Vec<u8>> {
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(&pair.recipient as &dyn age::Recipient))
            .map_err(|e| anyhow::anyhow!("creating age encryptor: {e}"))?;

    let mut wrapped = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut wrapped)
        .map_err(|e| anyhow::anyhow!("age key wrapping failed: {e}"))?;
    writer
        .write_all(content_key.as_bytes())
        .map_err(|e| anyhow::anyhow!("age key wrapping failed: {e}"))?;
    writer
        .finish()
        .map_err(|e| anyhow::anyhow!("age key wrapping failed: {e}"))?;

    Ok(wrapped)
}

fn age_unwrap(pair: &AgeKeyPair, wrapped: &[u8]) -> anyhow::Result<ContentKey> {
    let identity = pair.identity.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "age key {} has no identity: recipient-only keys cannot unwrap",
            pair.recipient
        )
    })?;

    let decryptor = age::Decryptor::new(wrapped)
        .map_err(|e| anyhow::anyhow!("parsing age-wrapped key: {e}"))?;
    let mut reader = decryptor
        .decrypt(std::iter::once(identity as &dyn age::Identity))
        .map_err(|_| anyhow::anyhow!("key unwrapping failed: wrong age identity or corrupted data"))?;

    let mut plaintext = Vec::with_capacity(KEY_SIZE);
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| anyhow::anyhow!("reading age-wrapped key: {e}"))?;

    let key = ContentKey::from_slice(&plaintext);
    plaintext.zeroize();
    key
}
