//! `s3://bucket/prefix` backend built on `object_store`.
//!
//! Credentials, region and endpoint come from the standard `AWS_*`
//! environment variables. Uploads are streamed as multipart uploads.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::error::StorageError;
use super::{BlobReader, BlobWriter, Storage};

pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    pub fn open(url: &Url) -> Result<Self, StorageError> {
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StorageError::InvalidDestination {
                uri: url.to_string(),
                reason: "missing bucket name".into(),
            })?
            .to_string();
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .build()?;
        Ok(Self::with_store(Arc::new(store), bucket, url.path()))
    }

    /// Wrap an already-built store. `prefix` is prepended to every target.
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn key(&self, target: &str) -> Result<ObjectPath, StorageError> {
        let target = target.trim_start_matches('/');
        let full = if self.prefix.is_empty() {
            target.to_string()
        } else {
            format!("{}/{}", self.prefix, target)
        };
        ObjectPath::parse(&full).map_err(|_| StorageError::InvalidPath(target.to_string()))
    }

    fn display_key(&self, key: &ObjectPath) -> PathBuf {
        PathBuf::from(format!("s3://{}/{}", self.bucket, key))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn writer(&self, target: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let key = self.key(target)?;
        Ok(Box::new(S3Writer {
            display: self.display_key(&key),
            upload: BufWriter::new(Arc::clone(&self.store), key.clone()),
            store: Arc::clone(&self.store),
            key,
        }))
    }

    async fn reader(&self, target: &str) -> Result<BlobReader, StorageError> {
        let key = self.key(target)?;
        let result = match self.store.get(&key).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(
                    self.display_key(&key).display().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;
        Ok(Box::new(std::io::Cursor::new(bytes.to_vec())))
    }

    fn describe(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

struct S3Writer {
    display: PathBuf,
    upload: BufWriter,
    store: Arc<dyn ObjectStore>,
    key: ObjectPath,
}

#[async_trait]
impl BlobWriter for S3Writer {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        self.upload
            .write_all(buf)
            .await
            .map_err(|e| StorageError::io(&self.display, e))
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        self.upload
            .shutdown()
            .await
            .map_err(|e| StorageError::io(&self.display, e))
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        let Self {
            upload, store, key, ..
        } = *self;
        // An unfinished multipart upload is never committed once dropped.
        drop(upload);
        match store.delete(&key).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
