//! `file://` backend: a directory on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::error::StorageError;
use super::{relative_target, BlobReader, BlobWriter, Storage};

#[derive(Debug)]
pub struct LocalStorage {
    base: PathBuf,
}

impl LocalStorage {
    /// Use `base` as the storage root, creating it if missing.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        tokio::fs::create_dir_all(&base)
            .await
            .map_err(|e| StorageError::io(&base, e))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, target: &str) -> Result<PathBuf, StorageError> {
        Ok(self.base.join(relative_target(target)?))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn writer(&self, target: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let path = self.resolve(target)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(Box::new(LocalWriter {
            path,
            file: BufWriter::new(file),
        }))
    }

    async fn reader(&self, target: &str) -> Result<BlobReader, StorageError> {
        let path = self.resolve(target)?;
        match File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.base.display())
    }
}

struct LocalWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

#[async_trait]
impl BlobWriter for LocalWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(buf)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.file
            .get_mut()
            .sync_all()
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        let Self { path, file } = *self;
        drop(file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed partial file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}
