//! OpenDAL-backed object store for S3-compatible endpoints

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::Operator;

use crate::store::{ObjectLocation, ObjectStore, PutObject, StoredObject};

/// Connection settings shared by every bucket of one endpoint
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub max_retries: usize,
}

impl StorageConfig {
    /// Build from s3ee-core config plus credentials.
    ///
    /// If `enforce_tls` is set and the endpoint uses HTTP, this returns an error.
    /// Otherwise a warning is logged for non-HTTPS endpoints.
    pub fn from_core_config(
        storage: &s3ee_core::config::StorageConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self> {
        if storage.endpoint.starts_with("http://") {
            if storage.enforce_tls {
                anyhow::bail!(
                    "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                    storage.endpoint
                );
            }
            tracing::warn!(
                endpoint = %storage.endpoint,
                "S3 endpoint uses plaintext HTTP; credentials and ciphertext travel unencrypted"
            );
        }

        Ok(Self {
            endpoint: storage.endpoint.clone(),
            region: storage.region.clone(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            max_retries: storage.max_retries,
        })
    }

    /// Same as [`StorageConfig::from_core_config`], reading `AWS_ACCESS_KEY_ID`
    /// and `AWS_SECRET_ACCESS_KEY` from the environment (empty when unset).
    pub fn from_env(storage: &s3ee_core::config::StorageConfig) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        Self::from_core_config(storage, &access_key, &secret_key)
    }
}

/// Build an OpenDAL Operator for one bucket of an S3-compatible endpoint.
///
/// Uses path-style addressing (the opendal 0.55 default), which MinIO and
/// SeaweedFS require.
pub fn build_operator(cfg: &StorageConfig, bucket: &str) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL S3 operator for bucket {bucket}"))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(cfg.max_retries)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// [`ObjectStore`] over OpenDAL operators, one per bucket.
///
/// Buckets are either registered explicitly or, when a [`StorageConfig`] is
/// present, built on first use.
pub struct OpendalStore {
    config: Option<StorageConfig>,
    operators: RwLock<HashMap<String, Operator>>,
}

impl OpendalStore {
    /// Store that builds S3 operators on demand.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config: Some(config),
            operators: RwLock::new(HashMap::new()),
        }
    }

    /// Store serving only explicitly registered buckets.
    pub fn with_operators(operators: impl IntoIterator<Item = (String, Operator)>) -> Self {
        Self {
            config: None,
            operators: RwLock::new(operators.into_iter().collect()),
        }
    }

    pub fn register(&self, bucket: impl Into<String>, op: Operator) {
        self.operators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(bucket.into(), op);
    }

    fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        if let Some(op) = self
            .operators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(bucket)
        {
            return Ok(op.clone());
        }

        let cfg = self.config.as_ref().ok_or_else(|| {
            opendal::Error::new(
                opendal::ErrorKind::ConfigInvalid,
                format!("no operator registered for bucket {bucket}"),
            )
        })?;
        let op = build_operator(cfg, bucket).map_err(|e| {
            opendal::Error::new(opendal::ErrorKind::ConfigInvalid, format!("{e:#}"))
        })?;
        self.register(bucket, op.clone());
        Ok(op)
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn put(&self, object: PutObject) -> opendal::Result<()> {
        let op = self.operator(&object.location.bucket)?;

        // A backend without user metadata would drop the entries and still succeed
        if !object.metadata.is_empty() && !op.info().full_capability().write_with_user_metadata {
            return Err(opendal::Error::new(
                opendal::ErrorKind::Unsupported,
                format!(
                    "backend {} cannot store user metadata for {}",
                    op.info().scheme(),
                    object.location
                ),
            ));
        }

        let mut write = op
            .write_with(&object.location.key, object.body)
            .user_metadata(object.metadata);
        if let Some(content_type) = &object.content_type {
            write = write.content_type(content_type);
        }
        write.await?;
        Ok(())
    }

    async fn get(&self, location: &ObjectLocation) -> opendal::Result<StoredObject> {
        let op = self.operator(&location.bucket)?;
        let meta = op.stat(&location.key).await?;

        // Pin the body to the version whose metadata was just read
        let body = match meta.etag() {
            Some(etag) if op.info().full_capability().read_with_if_match => {
                op.read_with(&location.key).if_match(etag).await?
            }
            _ => op.read(&location.key).await?,
        }
        .to_bytes();

        Ok(StoredObject {
            body,
            metadata: meta.user_metadata().cloned().unwrap_or_default(),
            content_type: meta.content_type().map(str::to_string),
        })
    }

    async fn delete(&self, location: &ObjectLocation) -> opendal::Result<()> {
        self.operator(&location.bucket)?
            .delete(&location.key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StorageConfig {
        StorageConfig {
            endpoint: "http://localhost:8333".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            max_retries: 2,
        }
    }

    #[test]
    fn test_build_operator_valid() {
        let op = build_operator(&test_config(), "test-bucket");
        assert!(op.is_ok(), "operator construction should succeed");
    }

    #[test]
    fn test_from_core_config_http_warning() {
        let storage = s3ee_core::config::StorageConfig {
            endpoint: "http://localhost:8333".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(StorageConfig::from_core_config(&storage, "key", "secret").is_ok());
    }

    #[test]
    fn test_from_core_config_http_enforce_tls() {
        let storage = s3ee_core::config::StorageConfig {
            endpoint: "http://insecure:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let result = StorageConfig::from_core_config(&storage, "key", "secret");
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_from_core_config_https() {
        let storage = s3ee_core::config::StorageConfig {
            endpoint: "https://s3.example.com".into(),
            enforce_tls: true,
            max_retries: 9,
            ..Default::default()
        };
        let cfg = StorageConfig::from_core_config(&storage, "key", "secret").unwrap();
        assert_eq!(cfg.max_retries, 9);
    }

    #[test]
    fn test_operators_built_on_demand_and_cached() {
        let store = OpendalStore::new(test_config());
        assert!(store.operator("b1").is_ok());
        assert_eq!(store.operators.read().unwrap().len(), 1);
        assert!(store.operator("b1").is_ok());
        assert_eq!(store.operators.read().unwrap().len(), 1);
    }

    fn memory_store(bucket: &str) -> OpendalStore {
        let op = Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish();
        OpendalStore::with_operators([(bucket.to_string(), op)])
    }

    fn put_request(key: &str, body: &'static [u8]) -> PutObject {
        PutObject {
            location: ObjectLocation::new("b", key),
            body: bytes::Bytes::from_static(body),
            metadata: HashMap::new(),
            content_type: Some("application/octet-stream".to_string()),
        }
    }

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let store = memory_store("b");
        store.put(put_request("dir/obj", b"ciphertext")).await.unwrap();

        let loc = ObjectLocation::new("b", "dir/obj");
        let obj = store.get(&loc).await.unwrap();
        assert_eq!(obj.body.as_ref(), b"ciphertext");
        assert_eq!(obj.content_type.as_deref(), Some("application/octet-stream"));
        assert!(obj.metadata.is_empty());

        store.delete(&loc).await.unwrap();
        let err = store.get(&loc).await.unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_memory_missing_object_is_not_found() {
        let store = memory_store("b");
        let err = store.get(&ObjectLocation::new("b", "absent")).await.unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_metadata_rejected_without_backend_support() {
        let store = memory_store("b");
        let mut request = put_request("obj", b"ciphertext");
        request
            .metadata
            .insert("x-amz-iv".to_string(), "AAAA".to_string());

        let err = store.put(request).await.unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::Unsupported);

        // Nothing was written
        let err = store.get(&ObjectLocation::new("b", "obj")).await.unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_config_invalid() {
        let store = memory_store("b");
        store.put(put_request("obj", b"x")).await.unwrap();
        let err = store
            .get(&ObjectLocation::new("other", "obj"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_unregistered_bucket_without_config() {
        let store = OpendalStore::with_operators(Vec::<(String, Operator)>::new());
        let err = store.operator("missing").unwrap_err();
        assert_eq!(err.kind(), opendal::ErrorKind::ConfigInvalid);
    }
}
