use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::auth::AccountCredentials;
use crate::cli::{StorageArgs, SyncArgs};
use crate::download::TransferOptions;
use crate::storage::{MultiStorage, SftpCredentials};
use crate::sync::SyncPolicy;
use crate::zoom::listing::API_CALL_CONCURRENCY_LIMIT;
use crate::zoom::RecordingType;

const MIB: u64 = 1024 * 1024;

/// Where recordings and the ledger are stored.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub destinations: Vec<String>,
    pub sftp: SftpCredentials,
}

impl StorageConfig {
    pub fn from_args(args: StorageArgs) -> anyhow::Result<Self> {
        let mut destinations = split_list(&args.destinations);
        if let Some(dir) = args.dir.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            destinations.push(format!("file://{}", expand_tilde(dir).display()));
        }
        if destinations.is_empty() {
            anyhow::bail!("No storage destinations configured; pass --destinations or --dir");
        }

        Ok(Self {
            destinations,
            sftp: SftpCredentials {
                user: args.sftp_user,
                password: args.sftp_password,
                key_path: args.sftp_key.as_deref().map(expand_tilde),
                host_key_sha256: args.sftp_host_key,
            },
        })
    }

    pub async fn open(&self) -> anyhow::Result<MultiStorage> {
        MultiStorage::open(&self.destinations, &self.sftp)
            .await
            .context("Failed to open storage destinations")
    }
}

/// Settings for the `sync` command.
pub struct Config {
    pub credentials: AccountCredentials,
    pub api_endpoint: Url,
    pub auth_endpoint: Url,
    pub storage: StorageConfig,
    pub state_directory: PathBuf,
    pub allowed_types: HashSet<RecordingType>,
    pub ignored_titles: HashSet<String>,

    pub interval: Duration,
    pub error_backoff: Duration,
    pub chunk_size: u64,
    pub concurrency: usize,
    pub start_year: i32,
    pub page_size: u32,

    pub delete_after: bool,
    pub dry_run: bool,
    pub once: bool,
    pub no_progress_bar: bool,
    pub notify_systemd: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &self.credentials)
            .field("api_endpoint", &self.api_endpoint.as_str())
            .field("auth_endpoint", &self.auth_endpoint.as_str())
            .field("storage", &self.storage)
            .field("allowed_types", &self.allowed_types)
            .field("ignored_titles", &self.ignored_titles)
            .field("interval", &self.interval)
            .field("concurrency", &self.concurrency)
            .field("chunk_size", &self.chunk_size)
            .field("delete_after", &self.delete_after)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Split a `;`-separated list, trimming entries and dropping empty ones.
pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a sweep interval.
///
/// Accepts plain seconds (`"1800"`) or a number with a unit suffix:
/// `s`, `m`, `h` or `d` (`"30m"`, `"2h"`).
pub(crate) fn parse_interval(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c.to_ascii_lowercase()),
        _ => (s, 's'),
    };
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => anyhow::bail!("Unknown interval unit '{}' in '{}'", unit, s),
    };
    let value: u64 = digits.trim().parse().with_context(|| {
        format!("Cannot parse '{s}' as an interval. Expected seconds (1800) or 90s, 30m, 2h, 1d")
    })?;
    let secs = value
        .checked_mul(multiplier)
        .with_context(|| format!("Interval '{s}' is too large"))?;
    if secs == 0 {
        anyhow::bail!("Interval must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_endpoint(name: &str, value: &str) -> anyhow::Result<Url> {
    Url::parse(value.trim()).with_context(|| format!("Invalid {name} URL '{value}'"))
}

impl Config {
    pub fn from_cli(args: SyncArgs) -> anyhow::Result<Self> {
        if args.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        if args.chunk_size_mb == 0 {
            anyhow::bail!("--chunk-size-mb must be at least 1");
        }
        if args.page_size == 0 {
            anyhow::bail!("--page-size must be at least 1");
        }

        let allowed_types: HashSet<RecordingType> = split_list(&args.recording_types)
            .into_iter()
            .map(RecordingType::from)
            .collect();
        if allowed_types.is_empty() {
            tracing::warn!("No recording types allowed, nothing will be transferred");
        }

        Ok(Self {
            credentials: AccountCredentials {
                account_id: args.account_id,
                client_id: args.client_id,
                client_secret: args.client_secret,
            },
            api_endpoint: parse_endpoint("API endpoint", &args.api_endpoint)?,
            auth_endpoint: parse_endpoint("auth endpoint", &args.auth_endpoint)?,
            storage: StorageConfig::from_args(args.storage)?,
            state_directory: expand_tilde(&args.state_directory),
            allowed_types,
            ignored_titles: split_list(&args.ignore_titles).into_iter().collect(),
            interval: parse_interval(&args.interval)?,
            error_backoff: Duration::from_secs(args.error_backoff),
            chunk_size: args
                .chunk_size_mb
                .checked_mul(MIB)
                .context("--chunk-size-mb is too large")?,
            concurrency: args.concurrency,
            start_year: args.start_year,
            page_size: args.page_size,
            delete_after: args.delete_after,
            dry_run: args.dry_run,
            once: args.once,
            no_progress_bar: args.no_progress_bar,
            notify_systemd: args.notify_systemd,
        })
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            allowed_types: self.allowed_types.clone(),
            ignored_titles: self.ignored_titles.clone(),
            delete_after: self.delete_after,
            start_year: self.start_year,
            listing_concurrency: self.concurrency.min(API_CALL_CONCURRENCY_LIMIT),
            transfer: TransferOptions {
                chunk_size: self.chunk_size,
                concurrency: self.concurrency,
            },
            dry_run: self.dry_run,
            no_progress_bar: self.no_progress_bar,
        }
    }
}
