//! S3-compatible Content Store using the AWS SDK.

use super::content_store::{
    BatchDeleteReport, StorageError, StorageProvider, StorageResult, ensure_key_safe,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    presigning::PresigningConfig,
    types::{Delete, ObjectIdentifier},
};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Debug, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint (MinIO, R2, ...). Bare `host:port` gets `http://`.
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

/// Mapping between keys, full object keys and public locators.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ObjectLayout {
    prefix: Option<String>,
    /// Origin that public locators are built from.
    public_base: String,
}

impl ObjectLayout {
    fn new(settings: &S3Settings, region: &str, endpoint: Option<&str>) -> Self {
        let public_base = match endpoint {
            Some(url) => format!("{}/{}", url, settings.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", settings.bucket, region),
        };
        Self {
            prefix: settings
                .prefix
                .as_ref()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            public_base,
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn strip_prefix<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/')),
            None => Some(full_key),
        }
    }

    fn locator_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, self.full_key(key))
    }

    fn key_for_locator(&self, locator: &str) -> Option<String> {
        let rest = locator
            .strip_prefix(self.public_base.as_str())?
            .strip_prefix('/')?;
        let rest = rest.split('?').next().unwrap_or(rest);
        let key = self.strip_prefix(rest)?;
        ensure_key_safe(key).ok()?;
        Some(key.to_string())
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn s3_error<E: std::fmt::Display>(err: E) -> StorageError {
    StorageError::S3(err.to_string())
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    layout: ObjectLayout,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        if settings.bucket.trim().is_empty() {
            return Err(StorageError::Config("s3 storage requires a bucket".into()));
        }
        if settings.access_key_id.is_some() ^ settings.secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .into(),
            ));
        }

        let region = settings
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());
        let endpoint = settings.endpoint.as_deref().map(normalize_endpoint);

        let mut builder = match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(key_id), Some(secret)) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(aws_sdk_s3::config::Region::new(region.clone()))
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    key_id,
                    secret,
                    None,
                    None,
                    "media-library-config",
                )),
            _ => {
                // Ambient credentials chain (env, profile, instance metadata).
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_sdk_s3::config::Region::new(region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };
        if let Some(url) = &endpoint {
            builder = builder.endpoint_url(url);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        let layout = ObjectLayout::new(&settings, &region, endpoint.as_deref());
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
            layout,
        })
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, data: Bytes, key: &str, content_type: &str) -> StorageResult<String> {
        ensure_key_safe(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.layout.full_key(key))
            .content_type(content_type)
            .body(data.into())
            .send()
            .await
            .map_err(s3_error)?;
        Ok(self.layout.locator_for(key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        ensure_key_safe(key)?;
        let config =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Signing(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.layout.full_key(key))
            .presigned(config)
            .await
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        ensure_key_safe(key)?;
        // delete_object is already a no-op for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.layout.full_key(key))
            .send()
            .await
            .map_err(s3_error)?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "s3", count = keys.len()))]
    async fn delete_batch(&self, keys: &[String]) -> StorageResult<BatchDeleteReport> {
        if keys.is_empty() {
            return Ok(BatchDeleteReport::default());
        }
        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(self.layout.full_key(key))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(s3_error)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(s3_error)?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(s3_error)?;

        // Quiet mode only reports failures.
        let failed: Vec<String> = output
            .errors()
            .iter()
            .filter_map(|err| err.key())
            .map(|full| self.layout.strip_prefix(full).unwrap_or(full).to_string())
            .collect();
        debug!(requested = keys.len(), failed = failed.len(), "s3 batch delete");
        Ok(BatchDeleteReport {
            deleted: keys.len().saturating_sub(failed.len()),
            failed,
        })
    }

    fn locator_for(&self, key: &str) -> String {
        self.layout.locator_for(key)
    }

    fn key_for_locator(&self, locator: &str) -> Option<String> {
        self.layout.key_for_locator(locator)
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(s3_error)?;
        Ok(())
    }
}
