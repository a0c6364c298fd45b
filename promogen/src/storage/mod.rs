//! Object storage for uploaded and generated media.
//!
//! Objects are addressed by key when written and by their public URL afterwards, since the
//! URL is what gets persisted on the project row. Reading back by URL only works for URLs this
//! store handed out.

pub mod local;
pub mod s3;

use crate::config::StorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("URL {0} does not belong to this store")]
    ForeignUrl(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return its public URL
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String>;

    /// Read back an object by the URL `put` returned
    async fn get(&self, url: &str) -> Result<Bytes>;

    /// Remove an object by URL. Missing objects are not an error.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Build the configured storage backend
pub async fn create_object_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Local { path, public_url } => {
            tracing::info!("Using local object storage at {}", path.display());
            Ok(Arc::new(LocalObjectStore::new(path.clone(), public_url.clone()).await?))
        }
        StorageConfig::S3 { bucket, .. } => {
            tracing::info!("Using S3 object storage in bucket {bucket}");
            Ok(Arc::new(S3ObjectStore::from_config(config).await?))
        }
    }
}

/// Object keys are relative, slash separated, and never climb out of their root
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// `{base}/{key}`, tolerating a base with or without a trailing slash
pub(crate) fn public_url_for(base: &Url, key: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), key)
}

/// Inverse of [`public_url_for`]
pub(crate) fn key_from_url(base: &Url, url: &str) -> Result<String> {
    let prefix = format!("{}/", base.as_str().trim_end_matches('/'));
    let key = url
        .strip_prefix(&prefix)
        .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
    validate_key(key)?;
    Ok(key.to_string())
}

/// File extension for a MIME type, defaulting to `bin`
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "video/mp4" => "mp4",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}
