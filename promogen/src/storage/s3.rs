//! S3-compatible storage backend.

use super::{ObjectStore, Result, StorageError, key_from_url, public_url_for, validate_key};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::{Client, error::DisplayErrorContext, primitives::ByteStream};
use bytes::Bytes;
use url::Url;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: String,
    public_url: Url,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String, prefix: String, public_url: Url) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
            public_url,
        }
    }

    /// Build a client from the ambient AWS environment plus the storage section
    pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let StorageConfig::S3 {
            bucket,
            region,
            endpoint,
            prefix,
            public_url,
            force_path_style,
        } = config
        else {
            anyhow::bail!("S3 object store requires an s3 storage configuration");
        };

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint.as_str());
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(*force_path_style)
            .build();

        Ok(Self::new(
            Client::from_conf(s3_config),
            bucket.clone(),
            prefix.clone(),
            public_url.clone(),
        ))
    }

    /// Key inside the bucket for a store key
    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String> {
        validate_key(key)?;
        let object_key = self.object_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(public_url_for(&self.public_url, &object_key))
    }

    async fn get(&self, url: &str) -> Result<Bytes> {
        let object_key = key_from_url(&self.public_url, url)?;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(object_key.clone())
                } else {
                    StorageError::Backend(DisplayErrorContext(&e).to_string())
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(body.into_bytes())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let object_key = key_from_url(&self.public_url, url)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
