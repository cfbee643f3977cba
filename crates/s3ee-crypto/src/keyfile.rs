//! Master key files
//!
//! One key per file; `#` lines and blank lines are ignored. The first remaining
//! line is one of:
//! - `AGE-SECRET-KEY-1...` age X25519 identity (wraps and unwraps)
//! - `age1...` age X25519 recipient (wraps only)
//! - standard base64 of a 32-byte symmetric key

use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::master::{AgeKeyPair, MasterKey};
use crate::KEY_SIZE;

/// Rendering of master keys into the key file format.
pub struct KeyFile;

impl KeyFile {
    /// Render `key` as key file contents, with a comment header.
    pub fn render(key: &MasterKey) -> SecretString {
        let body = match key {
            MasterKey::Symmetric(k) => STANDARD.encode(k.as_bytes()),
            MasterKey::Age(pair) => match pair.identity() {
                Some(identity) => identity.to_string().expose_secret().to_string(),
                None => pair.recipient().to_string(),
            },
        };
        SecretString::from(format!(
            "# s3ee {} master key\n# fingerprint: {}\n{body}\n",
            key.kind(),
            key.fingerprint()
        ))
    }

    /// Write `key` to `path`, readable by the owner only.
    pub fn write(path: &Path, key: &MasterKey) -> anyhow::Result<()> {
        use std::io::Write;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("creating key file {}", path.display()))?;
        file.write_all(Self::render(key).expose_secret().as_bytes())
            .with_context(|| format!("writing key file {}", path.display()))?;
        Ok(())
    }
}

/// Parse key file contents.
pub fn parse_key_file(contents: &SecretString) -> anyhow::Result<MasterKey> {
    let line = contents
        .expose_secret()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .context("key file contains no key")?;

    if line.starts_with("AGE-SECRET-KEY-") {
        let identity: age::x25519::Identity = line
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid age identity: {e}"))?;
        return Ok(MasterKey::Age(AgeKeyPair::from_identity(identity)));
    }

    if line.starts_with("age1") {
        let recipient: age::x25519::Recipient = line
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid age recipient: {e}"))?;
        return Ok(MasterKey::Age(AgeKeyPair::from_recipient(recipient)));
    }

    let mut bytes = STANDARD
        .decode(line)
        .map_err(|_| anyhow::anyhow!("symmetric key is not valid base64"))?;
    if bytes.len() != KEY_SIZE {
        let len = bytes.len();
        bytes.zeroize();
        anyhow::bail!("symmetric key has {len} bytes (expected {KEY_SIZE})");
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(MasterKey::symmetric(key))
}

/// Load and parse a key file.
pub fn load_key_file(path: &Path) -> anyhow::Result<MasterKey> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading key file {}", path.display()))?;
    parse_key_file(&SecretString::from(contents))
        .with_context(|| format!("parsing key file {}", path.display()))
}
