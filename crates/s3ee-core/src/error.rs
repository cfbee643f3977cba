use thiserror::Error;

pub type S3eeResult<T> = Result<T, S3eeError>;

#[derive(Debug, Error)]
pub enum S3eeError {
    #[error("config error: {0}")]
    Config(String),

    /// No master key matches the stored materials description.
    #[error("no master key found for materials description {0}")]
    KeyNotFound(String),

    /// The stored envelope is missing or cannot be parsed.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("byte-range reads are not supported for encrypted objects")]
    RangeNotSupported,

    #[error("crypto error: {0}")]
    Crypto(String),

    /// Object store failure, passed through as reported by the backend.
    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl S3eeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    /// Wrap an `anyhow` failure from the crypto helpers, keeping the context chain.
    pub fn crypto(err: anyhow::Error) -> Self {
        Self::Crypto(format!("{err:#}"))
    }

    /// True when the object store reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.kind() == opendal::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_passthrough() {
        let err: S3eeError =
            opendal::Error::new(opendal::ErrorKind::NotFound, "no such key").into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no such key"));
    }

    #[test]
    fn test_other_errors_are_not_not_found() {
        let denied: S3eeError =
            opendal::Error::new(opendal::ErrorKind::PermissionDenied, "denied").into();
        assert!(!denied.is_not_found());
        assert!(!S3eeError::KeyNotFound("{}".into()).is_not_found());
    }

    #[test]
    fn test_crypto_keeps_context_chain() {
        let err = anyhow::anyhow!("tag mismatch").context("decrypting chunk 3");
        let msg = S3eeError::crypto(err).to_string();
        assert!(msg.contains("decrypting chunk 3"));
        assert!(msg.contains("tag mismatch"));
    }
}
