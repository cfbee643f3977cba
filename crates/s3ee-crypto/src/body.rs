//! Chunked XChaCha20-Poly1305 body encryption
//!
//! Ciphertext layout:
//! ```text
//! [chunk 0: 65536 bytes ciphertext][16 bytes tag] ... [chunk n: <= 65536 bytes][16 bytes tag]
//! nonce_i = envelope nonce with bytes 16..24 XOR i (big-endian)
//! AAD_i   = i (8 bytes, big-endian) || final (1 byte: 1 for the last chunk, else 0)
//! ```
//!
//! Every chunk except the last carries exactly [`CHUNK_SIZE`] plaintext bytes, so
//! the frame layout reveals nothing beyond the total length. The final flag in the
//! AAD makes truncation at a chunk boundary detectable. An empty body is a single
//! empty final chunk.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::keys::ContentKey;
use crate::{CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

/// Encrypted size of a body of `plaintext_len` bytes.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    let chunks = plaintext_len.div_ceil(CHUNK_SIZE).max(1);
    plaintext_len + chunks * TAG_SIZE
}

/// Incremental body encryptor: feed full chunks, then one final chunk.
pub struct BodyEncryptor {
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; NONCE_SIZE],
    index: u64,
    finished: bool,
}

impl BodyEncryptor {
    pub fn new(content_key: &ContentKey, nonce: &[u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(content_key.as_bytes().into()),
            base_nonce: *nonce,
            index: 0,
            finished: false,
        }
    }

    /// Seal one chunk. Non-final chunks must be exactly `CHUNK_SIZE` bytes.
    ///
    /// Returns `[ciphertext][16-byte tag]`.
    pub fn seal_chunk(&mut self, chunk: &[u8], is_final: bool) -> anyhow::Result<Vec<u8>> {
        if self.finished {
            anyhow::bail!("body already sealed: no chunks may follow the final chunk");
        }
        if !is_final && chunk.len() != CHUNK_SIZE {
            anyhow::bail!(
                "non-final chunk {} has {} bytes (expected {CHUNK_SIZE})",
                self.index,
                chunk.len()
            );
        }
        if chunk.len() > CHUNK_SIZE {
            anyhow::bail!("chunk {} exceeds {CHUNK_SIZE} bytes", self.index);
        }

        let nonce = chunk_nonce(&self.base_nonce, self.index);
        let aad = build_aad(self.index, is_final);
        let sealed = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: chunk,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("chunk {} encryption failed: {e}", self.index))?;

        self.index += 1;
        self.finished = is_final;
        Ok(sealed)
    }
}

/// Incremental body decryptor over a complete ciphertext, yielding one
/// plaintext chunk per frame. Stops after the first error.
pub struct BodyDecryptor<'a> {
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; NONCE_SIZE],
    frames: std::slice::Chunks<'a, u8>,
    index: u64,
    failed: bool,
}

impl<'a> BodyDecryptor<'a> {
    pub fn new(
        content_key: &ContentKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &'a [u8],
    ) -> anyhow::Result<Self> {
        if ciphertext.len() < TAG_SIZE {
            anyhow::bail!(
                "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
                ciphertext.len()
            );
        }

        Ok(Self {
            cipher: XChaCha20Poly1305::new(content_key.as_bytes().into()),
            base_nonce: *nonce,
            frames: ciphertext.chunks(CHUNK_SIZE + TAG_SIZE),
            index: 0,
            failed: false,
        })
    }
}

impl Iterator for BodyDecryptor<'_> {
    type Item = anyhow::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let frame = self.frames.next()?;
        let is_final = self.frames.len() == 0;

        let nonce = chunk_nonce(&self.base_nonce, self.index);
        let aad = build_aad(self.index, is_final);
        let result = self
            .cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: frame,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                anyhow::anyhow!(
                    "chunk {} decryption failed: wrong key, corrupted, truncated or reordered data",
                    self.index
                )
            });

        self.failed = result.is_err();
        self.index += 1;
        Some(result)
    }
}

/// Encrypt a whole body, chunk by chunk.
pub fn encrypt_body(
    content_key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut encryptor = BodyEncryptor::new(content_key, nonce);
    let mut out = Vec::with_capacity(ciphertext_len(plaintext.len()));

    if plaintext.is_empty() {
        out.extend_from_slice(&encryptor.seal_chunk(&[], true)?);
        return Ok(out);
    }

    let total = plaintext.len().div_ceil(CHUNK_SIZE);
    for (i, chunk) in plaintext.chunks(CHUNK_SIZE).enumerate() {
        out.extend_from_slice(&encryptor.seal_chunk(chunk, i + 1 == total)?);
    }
    Ok(out)
}

/// Decrypt a whole body produced by [`encrypt_body`].
pub fn decrypt_body(
    content_key: &ContentKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in BodyDecryptor::new(content_key, nonce, ciphertext)? {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (b, i) in nonce[NONCE_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
        *b ^= i;
    }
    nonce
}

/// Build AAD: chunk_index (8 bytes BE) || final flag (1 byte)
fn build_aad(index: u64, is_final: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = u8::from(is_final);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_content_key, generate_nonce};
    use proptest::prelude::*;

    fn make_data(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8).collect()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let plaintext = b"hello, encrypted world!";

        let encrypted = encrypt_body(&key, &nonce, plaintext).unwrap();
        assert_ne!(&encrypted[..plaintext.len()], plaintext);
        let decrypted = decrypt_body(&key, &nonce, &encrypted).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_empty_body_is_one_tag() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();

        let encrypted = encrypt_body(&key, &nonce, b"").unwrap();
        assert_eq!(encrypted.len(), TAG_SIZE);
        assert_eq!(decrypt_body(&key, &nonce, &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_chunk_boundary_sizes() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();

        for size in [CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 2 * CHUNK_SIZE, 3 * CHUNK_SIZE + 17] {
            let data = make_data(size);
            let encrypted = encrypt_body(&key, &nonce, &data).unwrap();
            assert_eq!(encrypted.len(), ciphertext_len(size), "size {size}");
            assert_eq!(decrypt_body(&key, &nonce, &encrypted).unwrap(), data, "size {size}");
        }
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let nonce = generate_nonce().unwrap();
        let encrypted =
            encrypt_body(&generate_content_key().unwrap(), &nonce, b"secret data").unwrap();

        let result = decrypt_body(&generate_content_key().unwrap(), &nonce, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_wrong_nonce() {
        let key = generate_content_key().unwrap();
        let encrypted = encrypt_body(&key, &generate_nonce().unwrap(), b"secret data").unwrap();

        let result = decrypt_body(&key, &generate_nonce().unwrap(), &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();

        let mut encrypted = encrypt_body(&key, &nonce, b"secret data").unwrap();
        encrypted[3] ^= 0xFF;

        assert!(decrypt_body(&key, &nonce, &encrypted).is_err());
    }

    #[test]
    fn test_truncated_at_chunk_boundary() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let data = make_data(2 * CHUNK_SIZE + 100);

        let encrypted = encrypt_body(&key, &nonce, &data).unwrap();
        let truncated = &encrypted[..2 * (CHUNK_SIZE + TAG_SIZE)];

        let result = decrypt_body(&key, &nonce, truncated);
        assert!(result.is_err(), "dropping the final chunk must fail (final flag)");
    }

    #[test]
    fn test_reordered_chunks() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let data = make_data(3 * CHUNK_SIZE);
        let frame = CHUNK_SIZE + TAG_SIZE;

        let encrypted = encrypt_body(&key, &nonce, &data).unwrap();
        let mut swapped = encrypted[frame..2 * frame].to_vec();
        swapped.extend_from_slice(&encrypted[..frame]);
        swapped.extend_from_slice(&encrypted[2 * frame..]);

        assert!(decrypt_body(&key, &nonce, &swapped).is_err());
    }

    #[test]
    fn test_decryptor_stops_after_error() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let mut encrypted = encrypt_body(&key, &nonce, &make_data(3 * CHUNK_SIZE)).unwrap();
        encrypted[0] ^= 0x01;

        let results: Vec<_> = BodyDecryptor::new(&key, &nonce, &encrypted).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_ciphertext_too_short() {
        let key = generate_content_key().unwrap();
        let nonce = generate_nonce().unwrap();
        assert!(BodyDecryptor::new(&key, &nonce, &[0u8; TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_encryptor_rejects_short_non_final_chunk() {
        let key = generate_content_key().unwrap();
        let mut enc = BodyEncryptor::new(&key, &generate_nonce().unwrap());
        assert!(enc.seal_chunk(b"short", false).is_err());
    }

    #[test]
    fn test_encryptor_rejects_chunk_after_final() {
        let key = generate_content_key().unwrap();
        let mut enc = BodyEncryptor::new(&key, &generate_nonce().unwrap());
        enc.seal_chunk(b"last", true).unwrap();
        assert!(enc.seal_chunk(b"more", true).is_err());
    }

    #[test]
    fn test_chunk_nonces_distinct() {
        let base = [0x5Au8; NONCE_SIZE];
        assert_ne!(chunk_nonce(&base, 0), chunk_nonce(&base, 1));
        assert_eq!(chunk_nonce(&base, 0), base);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_roundtrip_any_length(len in 0usize..(3 * CHUNK_SIZE + 64)) {
            let key = generate_content_key().unwrap();
            let nonce = generate_nonce().unwrap();
            let data = make_data(len);

            let encrypted = encrypt_body(&key, &nonce, &data).unwrap();
            prop_assert_eq!(encrypted.len(), ciphertext_len(len));
            prop_assert_eq!(decrypt_body(&key, &nonce, &encrypted).unwrap(), data);
        }
    }
}
