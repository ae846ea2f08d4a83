use crate::constants::{APP_DIR_NAME, ENV_LOG, ENV_LOG_FILE, MAX_LOG_BYTES};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "secrets-manager.log";

/// Level used when `SECRETS_MANAGER_LOG` is not set
fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `%LOCALAPPDATA%\SecretsManager\logs\secrets-manager.log`
pub fn log_file_path() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(base)
        .join(APP_DIR_NAME)
        .join("logs")
        .join(LOG_FILE_NAME)
}

/// Move an oversized log aside to `.log.bak`, replacing any older backup.
fn rotate_if_needed(path: &Path, max_bytes: u64) {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > max_bytes {
            let backup = path.with_extension("log.bak");
            let _ = fs::remove_file(&backup);
            let _ = fs::rename(path, &backup);
        }
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    rotate_if_needed(path, MAX_LOG_BYTES);
    OpenOptions::new().create(true).append(true).open(path).ok()
}

fn file_logging_enabled() -> bool {
    std::env::var(ENV_LOG_FILE)
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Install the global subscriber
///
/// Logs go to stderr, and also to the log file when
/// `SECRETS_MANAGER_LOG_FILE=1`. Calling this twice is harmless.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let file_layer = if file_logging_enabled() {
        open_log_file(&log_file_path()).map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        })
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init();
}
