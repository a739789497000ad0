//! alidrive-uploader: upload a local file or directory tree to the drive.

use alidrive_uploader::api::drive::{format_file_size, ReqwestTransport, DEFAULT_TIMEOUT};
use alidrive_uploader::settings::Config;
use alidrive_uploader::upload_manager::{UploadManager, UploadStatus};
use alidrive_uploader::{DriveClient, SqliteCredentialStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alidrive-uploader")]
#[command(about = "Upload local files to the drive with rapid upload and chunked transfer")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the credential database.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable verbose request/response logging.
    #[arg(short, long)]
    debug: bool,

    /// Proxy prefix prepended to every request target.
    #[arg(long)]
    proxy: Option<String>,

    /// Local file or directory to upload.
    local: PathBuf,

    /// Remote directory, relative to the configured root folder.
    #[arg(default_value = "")]
    remote: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.debug |= cli.debug;
    if let Some(proxy) = cli.proxy {
        config.proxy = proxy;
        config.validate()?;
    }

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    tracing::debug!(
        transfers = config.transfers(),
        "uploads run sequentially; transfers is recorded only"
    );

    let store = match cli.database {
        Some(path) => SqliteCredentialStore::new(path),
        None => SqliteCredentialStore::open_default()?,
    };
    let stored = store.load(&config.ali_drive.drive_id)?;
    let instance = config.to_instance(stored);
    let transport = ReqwestTransport::new(DEFAULT_TIMEOUT)?;
    let mut drive = DriveClient::new(instance, Box::new(transport), Box::new(store));

    drive
        .refresh_token()
        .context("refreshing access token at startup")?;

    let state = UploadManager::new().run(&mut drive, &cli.local, &cli.remote)?;

    let transferred: u64 = state.completed.iter().map(|task| task.size).sum();
    let rapid = state
        .completed
        .iter()
        .filter(|task| task.status == UploadStatus::Rapid)
        .count();
    for task in &state.failed {
        tracing::warn!(
            file = %task.local_path.display(),
            error = task.error_message.as_deref().unwrap_or_default(),
            "not uploaded"
        );
    }
    tracing::info!(
        completed = state.completed.len(),
        rapid,
        failed = state.failed.len(),
        size = %format_file_size(transferred as f64),
        "upload batch finished"
    );
    Ok(state.failed.is_empty())
}
