//! Log file handling and `tracing-subscriber` setup.
//!
//! Logs always go to a file so they never interleave with the REPL.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dapper_config::{Config, DapperPaths};
use tracing_subscriber::EnvFilter;

/// Size at which `dapper.log` is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the live log.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "dapper.log";

/// Log file to use: `log.file` from config, else `<log_dir>/dapper.log`.
pub fn log_file_path(config: &Config, paths: &dyn DapperPaths) -> PathBuf {
    config
        .log
        .file
        .clone()
        .unwrap_or_else(|| paths.log_dir().join(LOG_FILE_NAME))
}

/// Create the parent directory of `log_path` if missing.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// ```text
///   dapper.log   -> dapper.log.1
///   dapper.log.1 -> dapper.log.2
///   dapper.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Normalize a level name for `EnvFilter`; unknown names become `info`.
pub fn level_filter(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}

/// Install the global subscriber writing to the configured log file.
///
/// `RUST_LOG` wins over `log.level`. Returns the log file path.
pub fn init(config: &Config, paths: &dyn DapperPaths) -> Result<PathBuf> {
    let log_path = log_file_path(config, paths);
    ensure_log_dir(&log_path)
        .with_context(|| format!("failed to create log directory for {}", log_path.display()))?;
    if let Err(e) = rotate_log_files(&log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES) {
        eprintln!("dapper: log rotation failed: {e}");
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(config.log.level.as_str())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
    Ok(log_path)
}
