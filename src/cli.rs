use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "zoomdl-rs",
    version,
    about = "Sync cloud meeting recordings to local, S3 and SFTP storage"
)]
pub struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true, env = "ZOOMDL_LOG_LEVEL")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sweep recordings into storage, repeatedly unless --once is given
    Sync(SyncArgs),
    /// Show what the ledger on the configured storage knows
    Status(StatusArgs),
}

/// Where recordings and the ledger live. Shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// ';'-separated destination URIs (file://, s3://, sftp://)
    #[arg(long, env = "ZOOMDL_DESTINATIONS", default_value = "")]
    pub destinations: String,

    /// Local directory, added as a file:// destination
    #[arg(long, env = "ZOOMDL_DIR")]
    pub dir: Option<String>,

    /// SFTP login for destinations without user@ in the URI
    #[arg(long, env = "ZOOMDL_SFTP_USER")]
    pub sftp_user: Option<String>,

    /// SFTP password.
    /// WARNING: passing via --sftp-password is visible in process listings.
    /// Prefer the ZOOMDL_SFTP_PASSWORD environment variable instead.
    #[arg(long, env = "ZOOMDL_SFTP_PASSWORD")]
    pub sftp_password: Option<String>,

    /// Private key for SFTP public-key authentication
    #[arg(long, env = "ZOOMDL_SFTP_KEY")]
    pub sftp_key: Option<String>,

    /// Expected SFTP host key SHA-256 fingerprint (base64)
    #[arg(long, env = "ZOOMDL_SFTP_HOST_KEY")]
    pub sftp_host_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Account id for the server-to-server OAuth app
    #[arg(long, env = "ZOOMDL_USER_ID")]
    pub account_id: String,

    /// OAuth app client id
    #[arg(long, env = "ZOOMDL_CLIENT_ID")]
    pub client_id: String,

    /// OAuth app client secret.
    /// WARNING: passing via --client-secret is visible in process listings.
    /// Prefer the ZOOMDL_CLIENT_SECRET environment variable instead.
    #[arg(long, env = "ZOOMDL_CLIENT_SECRET")]
    pub client_secret: String,

    /// Recording API base URL
    #[arg(long, env = "ZOOMDL_API_ENDPOINT", default_value = "https://api.zoom.us/v2")]
    pub api_endpoint: String,

    /// OAuth host; the token path is appended
    #[arg(long, env = "ZOOMDL_AUTH_ENDPOINT", default_value = "https://zoom.us")]
    pub auth_endpoint: String,

    /// ';'-separated recording types to transfer
    #[arg(
        long,
        env = "ZOOMDL_RECORDING_TYPES",
        default_value = "shared_screen_with_speaker_view"
    )]
    pub recording_types: String,

    /// ';'-separated meeting topics to never transfer
    #[arg(long, env = "ZOOMDL_IGNORE_TITLES", default_value = "")]
    pub ignore_titles: String,

    /// Delete cloud recordings once every file of the meeting is stored
    #[arg(long, env = "ZOOMDL_DELETE_AFTER")]
    pub delete_after: bool,

    /// Time between sweeps (e.g. 1800, 90s, 30m, 2h, 1d)
    #[arg(long, env = "ZOOMDL_DURATION", default_value = "30m")]
    pub interval: String,

    /// Seconds to wait after a failed sweep
    #[arg(long, env = "ZOOMDL_ERROR_BACKOFF", default_value_t = 5)]
    pub error_backoff: u64,

    /// Parallel chunk requests per file
    #[arg(long, env = "ZOOMDL_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Chunk size in MiB
    #[arg(long = "chunk-size-mb", env = "ZOOMDL_CHUNKSIZE_MB", default_value_t = 256)]
    pub chunk_size_mb: u64,

    /// Listing floor year when the ledger is empty
    #[arg(long, env = "ZOOMDL_START_YEAR", default_value_t = 2018)]
    pub start_year: i32,

    /// Meetings per listing page
    #[arg(long, env = "ZOOMDL_PAGE_SIZE", default_value_t = 300)]
    pub page_size: u32,

    /// List and filter, but do not transfer, delete or write the ledger
    #[arg(long)]
    pub dry_run: bool,

    /// Run one sweep and exit
    #[arg(long)]
    pub once: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Send sd_notify messages to systemd
    #[arg(long, env = "ZOOMDL_NOTIFY_SYSTEMD")]
    pub notify_systemd: bool,

    /// Directory for the single-instance lock file
    #[arg(long, env = "ZOOMDL_STATE_DIRECTORY", default_value = "~/.zoomdl-rs")]
    pub state_directory: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub storage: StorageArgs,
}
