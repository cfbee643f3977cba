//! s3ee-crypto: envelope encryption primitives
//!
//! Every object body is sealed under a fresh content key; the content key is
//! wrapped under a long-lived master key and travels with the object inside
//! an [`Envelope`].
//!
//! ```text
//! MasterKey
//!   ├── Symmetric (256-bit)  ── AES-256-SIV key wrap (HKDF-SHA256 expanded to 512 bits)
//!   └── Age X25519 key pair  ── age public-key encryption of the raw content key
//!         │
//!         └── ContentKey (per object, 256-bit random)
//!               └── Body: XChaCha20-Poly1305, 64 KiB chunks,
//!                   nonce = envelope nonce ^ chunk_idx, AAD = chunk_idx || final
//! ```

pub mod body;
pub mod codec;
pub mod envelope;
pub mod keyfile;
pub mod keys;
pub mod master;
pub mod provider;

pub use body::{decrypt_body, encrypt_body, BodyDecryptor, BodyEncryptor};
pub use codec::EnvelopeCodec;
pub use envelope::{EncryptionMaterials, Envelope, MaterialsDescription};
pub use keyfile::{load_key_file, parse_key_file, KeyFile};
pub use keys::{generate_content_key, generate_nonce, ContentKey};
pub use master::{AgeKeyPair, MasterKey, SymmetricKey};
pub use provider::{DefaultKeyProvider, KeyProvider, RotatingKeyProvider, KEY_NAME_FIELD};

/// Size of a content key or symmetric master key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Plaintext bytes per body chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Content algorithm identifier recorded in every envelope
pub const CONTENT_ALGORITHM: &str = "XChaCha20-Poly1305/Chunked64K";
