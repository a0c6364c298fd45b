//! Local filesystem storage backend, served by the app itself under `/media`.

use super::{ObjectStore, Result, StorageError, key_from_url, public_url_for, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

pub struct LocalObjectStore {
    base_path: PathBuf,
    public_url: Url,
}

impl LocalObjectStore {
    pub async fn new(base_path: PathBuf, public_url: Url) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path, public_url })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<String> {
        validate_key(key)?;
        let full_path = self.base_path.join(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;

        Ok(public_url_for(&self.public_url, key))
    }

    async fn get(&self, url: &str) -> Result<Bytes> {
        let key = key_from_url(&self.public_url, url)?;
        match fs::read(self.base_path.join(&key)).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let key = key_from_url(&self.public_url, url)?;
        match fs::remove_file(self.base_path.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
