use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{S3eeError, S3eeResult};

/// Suffix appended to an object key to address its instruction object.
pub const DEFAULT_INSTRUCTION_SUFFIX: &str = ".instruction";

/// Top-level configuration (loaded from s3ee.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3eeConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub keys: KeysConfig,
}

impl S3eeConfig {
    /// Parse a TOML document and validate the encryption section.
    pub fn from_toml(content: &str) -> S3eeResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| S3eeError::config(format!("parsing TOML: {e}")))?;
        config.encryption.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> S3eeResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| S3eeError::config(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Maximum retries for transient store failures
    pub max_retries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            enforce_tls: false,
            max_retries: 5,
        }
    }
}

/// Where an object's envelope is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeLocation {
    /// Envelope fields embedded in the ciphertext object's metadata
    #[default]
    Metadata,
    /// Envelope stored as a sibling object at `key + suffix`
    InstructionFile,
}

impl EnvelopeLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::InstructionFile => "instruction_file",
        }
    }
}

impl fmt::Display for EnvelopeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeLocation {
    type Err = S3eeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(Self::Metadata),
            "instruction_file" => Ok(Self::InstructionFile),
            other => Err(S3eeError::config(format!(
                "invalid envelope_location {other:?} (expected \"metadata\" or \"instruction_file\")"
            ))),
        }
    }
}

/// Envelope placement defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// "metadata" or "instruction_file"
    pub envelope_location: String,
    /// Suffix of the instruction object key
    pub instruction_file_suffix: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            envelope_location: EnvelopeLocation::Metadata.as_str().into(),
            instruction_file_suffix: DEFAULT_INSTRUCTION_SUFFIX.into(),
        }
    }
}

impl EncryptionConfig {
    pub fn location(&self) -> S3eeResult<EnvelopeLocation> {
        self.envelope_location.parse()
    }

    pub fn validate(&self) -> S3eeResult<()> {
        self.location()?;
        if self.instruction_file_suffix.is_empty() {
            return Err(S3eeError::config("instruction_file_suffix must not be empty"));
        }
        Ok(())
    }
}

/// Master key files by logical name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Name of the key used for new writes
    pub current: Option<String>,
    /// Logical key name -> key file path
    pub files: BTreeMap<String, PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[storage]
endpoint = "https://s3.example.com"
region = "eu-west-1"
enforce_tls = true

[encryption]
envelope_location = "instruction_file"
instruction_file_suffix = ".envelope"

[keys]
current = "k2"

[keys.files]
k1 = "/etc/s3ee/k1.key"
k2 = "/etc/s3ee/k2.key"
"#;
        let config = S3eeConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.storage.endpoint, "https://s3.example.com");
        assert!(config.storage.enforce_tls);
        assert_eq!(
            config.encryption.location().unwrap(),
            EnvelopeLocation::InstructionFile
        );
        assert_eq!(config.encryption.instruction_file_suffix, ".envelope");
        assert_eq!(config.keys.current.as_deref(), Some("k2"));
        assert_eq!(config.keys.files.len(), 2);
        assert_eq!(config.keys.files["k1"], PathBuf::from("/etc/s3ee/k1.key"));
    }

    #[test]
    fn test_parse_defaults() {
        let config = S3eeConfig::from_toml("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.max_retries, 5);
        assert_eq!(config.encryption.location().unwrap(), EnvelopeLocation::Metadata);
        assert_eq!(
            config.encryption.instruction_file_suffix,
            DEFAULT_INSTRUCTION_SUFFIX
        );
        assert!(config.keys.current.is_none());
    }

    #[test]
    fn test_invalid_location_rejected() {
        let err = S3eeConfig::from_toml("[encryption]\nenvelope_location = \"header\"\n")
            .unwrap_err();
        assert!(matches!(err, S3eeError::Config(_)));
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_non_string_suffix_rejected() {
        let err = S3eeConfig::from_toml("[encryption]\ninstruction_file_suffix = 7\n")
            .unwrap_err();
        assert!(matches!(err, S3eeError::Config(_)));
    }

    #[test]
    fn test_empty_suffix_rejected() {
        let err = S3eeConfig::from_toml("[encryption]\ninstruction_file_suffix = \"\"\n")
            .unwrap_err();
        assert!(matches!(err, S3eeError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = S3eeConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.endpoint, "http://localhost:8333");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = S3eeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = S3eeConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(
            config.encryption.envelope_location,
            parsed.encryption.envelope_location
        );
    }

    #[test]
    fn test_location_display_parses_back() {
        for loc in [EnvelopeLocation::Metadata, EnvelopeLocation::InstructionFile] {
            assert_eq!(loc.to_string().parse::<EnvelopeLocation>().unwrap(), loc);
        }
    }
}
