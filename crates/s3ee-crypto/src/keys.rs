//! Content key and nonce generation

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::{KEY_SIZE, NONCE_SIZE};

/// A per-object 256-bit content key. Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Rebuild a content key from unwrapped bytes, rejecting the wrong length.
    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "content key has wrong size: {} bytes (expected {KEY_SIZE})",
                bytes.len()
            )
        })?;
        Ok(Self::from_bytes(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key from the OS CSPRNG.
///
/// Fails only if the operating system cannot supply randomness.
pub fn generate_content_key() -> anyhow::Result<ContentKey> {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| anyhow::anyhow!("OS randomness unavailable: {e}"))?;
    Ok(ContentKey::from_bytes(bytes))
}

/// Generate a random 192-bit body nonce from the OS CSPRNG.
pub fn generate_nonce() -> anyhow::Result<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| anyhow::anyhow!("OS randomness unavailable: {e}"))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_generation() {
        let k1 = generate_content_key().unwrap();
        let k2 = generate_content_key().unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_nonce_generation() {
        let n1 = generate_nonce().unwrap();
        let n2 = generate_nonce().unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert!(ContentKey::from_slice(&[0u8; 16]).is_err());
        assert!(ContentKey::from_slice(&[0u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = ContentKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
