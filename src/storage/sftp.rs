//! `sftp://[user@]host[:port][/base]` backend.
//!
//! `ssh2` is a blocking library, so every remote operation runs on the
//! blocking thread pool. The session is opened once per backend and shared by
//! every writer and reader.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use ssh2::{ErrorCode, HashType, Session, Sftp};
use url::Url;

use super::error::StorageError;
use super::{relative_target, BlobReader, BlobWriter, Storage};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Credentials for every `sftp://` destination.
#[derive(Clone, Default)]
pub struct SftpCredentials {
    /// Login used when the URI carries no user name.
    pub user: Option<String>,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    /// Expected SHA-256 host key fingerprint, base64 with or without the
    /// `SHA256:` prefix.
    pub host_key_sha256: Option<String>,
}

impl std::fmt::Debug for SftpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("host_key_sha256", &self.host_key_sha256)
            .finish()
    }
}

/// Connection parameters parsed from an `sftp://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SftpTarget {
    user: String,
    host: String,
    port: u16,
    base: PathBuf,
}

impl SftpTarget {
    /// The user name in the URI wins over `default_user`.
    fn parse(url: &Url, default_user: Option<&str>) -> Result<Self, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidDestination {
            uri: url.to_string(),
            reason: reason.to_string(),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let user = match url.username() {
            "" => default_user
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| invalid("missing user name; add user@ or pass --sftp-user"))?,
            user => user,
        }
        .to_string();
        let base = match url.path().trim_end_matches('/') {
            "" => PathBuf::from("."),
            path => PathBuf::from(path),
        };
        Ok(Self {
            user,
            host,
            port: url.port().unwrap_or(22),
            base,
        })
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Compare a base64 SHA-256 fingerprint against the pinned one, ignoring the
/// `SHA256:` prefix and base64 padding.
fn fingerprint_matches(actual: &str, expected: &str) -> bool {
    let normalize = |s: &str| {
        s.trim()
            .trim_start_matches("SHA256:")
            .trim_end_matches('=')
            .to_string()
    };
    normalize(actual) == normalize(expected)
}

struct Connection {
    // Kept alive for as long as the SFTP channel is in use.
    _session: Session,
    sftp: Sftp,
}

pub struct SftpStorage {
    conn: Arc<Connection>,
    target: SftpTarget,
}

impl std::fmt::Debug for SftpStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpStorage")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl SftpStorage {
    pub async fn connect(url: &Url, credentials: &SftpCredentials) -> Result<Self, StorageError> {
        let target = SftpTarget::parse(url, credentials.user.as_deref())?;
        let credentials = credentials.clone();
        let for_task = target.clone();
        let conn = tokio::task::spawn_blocking(move || connect_blocking(&for_task, &credentials))
            .await??;
        tracing::debug!(address = %target.address(), user = %target.user, "SFTP session established");
        Ok(Self {
            conn: Arc::new(conn),
            target,
        })
    }

    fn resolve(&self, target: &str) -> Result<PathBuf, StorageError> {
        Ok(self.target.base.join(relative_target(target)?))
    }
}

fn connect_blocking(
    target: &SftpTarget,
    credentials: &SftpCredentials,
) -> Result<Connection, StorageError> {
    let address = target.address();
    let tcp = TcpStream::connect(&address).map_err(|e| StorageError::io(&address, e))?;
    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    if let Some(expected) = &credentials.host_key_sha256 {
        let actual = session
            .host_key_hash(HashType::Sha256)
            .map(|hash| base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash))
            .unwrap_or_default();
        if !fingerprint_matches(&actual, expected) {
            return Err(StorageError::HostKeyMismatch {
                host: address,
                actual,
            });
        }
    }

    if let Some(key) = &credentials.key_path {
        session.userauth_pubkey_file(&target.user, None, key, credentials.password.as_deref())?;
    } else if let Some(password) = &credentials.password {
        session.userauth_password(&target.user, password)?;
    } else {
        session.userauth_agent(&target.user)?;
    }
    if !session.authenticated() {
        return Err(StorageError::InvalidDestination {
            uri: format!("sftp://{}@{}", target.user, address),
            reason: "authentication failed".into(),
        });
    }

    let sftp = session.sftp()?;
    Ok(Connection {
        _session: session,
        sftp,
    })
}

fn is_no_such_file(e: &ssh2::Error) -> bool {
    e.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE)
}

/// Create `dir` and any missing ancestors.
fn create_dir_all(sftp: &Sftp, dir: &Path) -> Result<(), StorageError> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || sftp.stat(path).is_ok() {
            break;
        }
        missing.push(path.to_path_buf());
        current = path.parent();
    }
    for path in missing.iter().rev() {
        sftp.mkdir(path, 0o755)?;
    }
    Ok(())
}

#[async_trait]
impl Storage for SftpStorage {
    async fn writer(&self, target: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let path = self.resolve(target)?;
        let conn = Arc::clone(&self.conn);
        let task_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<ssh2::File, StorageError> {
            if let Some(parent) = task_path.parent() {
                create_dir_all(&conn.sftp, parent)?;
            }
            Ok(conn.sftp.create(&task_path)?)
        })
        .await??;

        Ok(Box::new(SftpWriter {
            conn: Arc::clone(&self.conn),
            path,
            file: Some(file),
        }))
    }

    async fn reader(&self, target: &str) -> Result<BlobReader, StorageError> {
        let path = self.resolve(target)?;
        let conn = Arc::clone(&self.conn);
        let contents = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, StorageError> {
            let mut file = match conn.sftp.open(&path) {
                Ok(file) => file,
                Err(e) if is_no_such_file(&e) => {
                    return Err(StorageError::NotFound(path.display().to_string()))
                }
                Err(e) => return Err(e.into()),
            };
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| StorageError::io(&path, e))?;
            Ok(buf)
        })
        .await??;
        Ok(Box::new(std::io::Cursor::new(contents)))
    }

    fn describe(&self) -> String {
        let base = match self.target.base.to_str() {
            Some(".") => String::new(),
            _ => self.target.base.display().to_string(),
        };
        format!("sftp://{}@{}{}", self.target.user, self.target.address(), base)
    }
}

struct SftpWriter {
    conn: Arc<Connection>,
    path: PathBuf,
    /// `None` once a blocking write failed and took the handle with it.
    file: Option<ssh2::File>,
}

impl SftpWriter {
    fn take_file(&mut self) -> Result<ssh2::File, StorageError> {
        self.file.take().ok_or_else(|| {
            StorageError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "remote file handle lost"),
            )
        })
    }
}

#[async_trait]
impl BlobWriter for SftpWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        let mut file = self.take_file()?;
        let data = buf.to_vec();
        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<ssh2::File, StorageError> {
            file.write_all(&data)
                .map_err(|e| StorageError::io(&path, e))?;
            Ok(file)
        })
        .await??;
        self.file = Some(file);
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        let mut file = self.take_file()?;
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            file.close()?;
            Ok(())
        })
        .await?
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StorageError> {
        let file = self.file.take();
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            drop(file);
            match conn.sftp.unlink(&path) {
                Ok(()) => Ok(()),
                Err(e) if is_no_such_file(&e) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}
