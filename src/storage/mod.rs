//! Storage fan-out layer.
//!
//! A [`Storage`] writes and reads named blobs. [`MultiStorage`] combines any
//! number of backends (`file://`, `s3://`, `sftp://`) into one: a write goes to
//! every backend, a read only ever touches the first one.

pub mod error;
pub mod local;
pub mod s3;
pub mod sftp;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures_util::future::{join_all, try_join_all};
use tokio::io::AsyncRead;
use url::Url;

pub use self::error::StorageError;
use self::error::combine;
use self::local::LocalStorage;
use self::s3::S3Storage;
pub use self::sftp::SftpCredentials;
use self::sftp::SftpStorage;

pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// An open write stream for one blob.
///
/// Exactly one of [`close`](BlobWriter::close) or [`abort`](BlobWriter::abort)
/// must end the stream. `close` commits the data; `abort` discards whatever
/// was written and removes the partial blob.
#[async_trait]
pub trait BlobWriter: Send {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError>;

    async fn close(self: Box<Self>) -> Result<(), StorageError>;

    async fn abort(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Open `target` for writing, replacing any existing blob.
    async fn writer(&self, target: &str) -> Result<Box<dyn BlobWriter>, StorageError>;

    async fn reader(&self, target: &str) -> Result<BlobReader, StorageError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Normalize a storage target into a relative path that stays inside the
/// backend root.
pub(crate) fn relative_target(target: &str) -> Result<PathBuf, StorageError> {
    let path = Path::new(target);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(target.to_string()))
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(target.to_string()));
    }
    Ok(relative)
}

/// Every configured destination behind one [`Storage`].
pub struct MultiStorage {
    backends: Vec<Box<dyn Storage>>,
}

impl std::fmt::Debug for MultiStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.describe()))
            .finish()
    }
}

impl MultiStorage {
    /// Open one backend per destination URI. Blank entries are skipped; an
    /// unknown scheme fails the whole call.
    pub async fn open(
        destinations: &[String],
        sftp_credentials: &SftpCredentials,
    ) -> Result<Self, StorageError> {
        let mut backends: Vec<Box<dyn Storage>> = Vec::with_capacity(destinations.len());
        for uri in destinations {
            let uri = uri.trim();
            if uri.is_empty() {
                continue;
            }
            let backend = open_backend(uri, sftp_credentials).await?;
            tracing::debug!(destination = %backend.describe(), "Opened storage destination");
            backends.push(backend);
        }
        Self::from_backends(backends)
    }

    pub fn from_backends(backends: Vec<Box<dyn Storage>>) -> Result<Self, StorageError> {
        if backends.is_empty() {
            return Err(StorageError::NoDestinations);
        }
        Ok(Self { backends })
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }
}

async fn open_backend(
    uri: &str,
    sftp_credentials: &SftpCredentials,
) -> Result<Box<dyn Storage>, StorageError> {
    // Taken verbatim so relative paths like `file://./out` keep working.
    if let Some(path) = uri.strip_prefix("file://") {
        if path.is_empty() {
            return Err(StorageError::InvalidDestination {
                uri: uri.to_string(),
                reason: "missing path".into(),
            });
        }
        return Ok(Box::new(LocalStorage::open(path).await?));
    }

    let url = Url::parse(uri).map_err(|e| StorageError::InvalidDestination {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "s3" => Ok(Box::new(S3Storage::open(&url)?)),
        "sftp" => Ok(Box::new(SftpStorage::connect(&url, sftp_credentials).await?)),
        scheme => Err(StorageError::UnsupportedScheme {
            scheme: scheme.to_string(),
            uri: uri.to_string(),
        }),
    }
}

#[async_trait]
impl Storage for MultiStorage {
    async fn writer(&self, target: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let mut writers: Vec<Box<dyn BlobWriter>> = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            match backend.writer(target).await {
                Ok(writer) => writers.push(writer),
                Err(e) => {
                    // Release whatever was already opened before reporting.
                    for result in join_all(writers.into_iter().map(|w| w.abort())).await {
                        if let Err(abort_err) = result {
                            tracing::warn!(error = %abort_err, blob = target, "Failed to abort writer");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(Box::new(MultiWriter { writers }))
    }

    async fn reader(&self, target: &str) -> Result<BlobReader, StorageError> {
        match self.backends.first() {
            Some(primary) => primary.reader(target).await,
            None => Err(StorageError::NoDestinations),
        }
    }

    fn describe(&self) -> String {
        self.backends
            .iter()
            .map(|b| b.describe())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Write stream fanning out to one writer per backend.
pub struct MultiWriter {
    writers: Vec<Box<dyn BlobWriter>>,
}

#[async_trait]
impl BlobWriter for MultiWriter {
    /// Write to every backend; the first failure is returned as soon as it
    /// happens.
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        try_join_all(self.writers.iter_mut().map(|w| w.write(buf))).await?;
        Ok(())
    }

    /// Close every backend, reporting all failures together.
    async fn close(self: Box<Self>) -> Result<(), StorageError> {
        let results = join_all(self.writers.into_iter().map(|w| w.close())).await;
        combine(results.into_iter().filter_map(Result::err).collect())
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        let results = join_all(self.writers.into_iter().map(|w| w.abort())).await;
        combine(results.into_iter().filter_map(Result::err).collect())
    }
}
