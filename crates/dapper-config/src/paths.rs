use std::path::PathBuf;

use crate::error::ConfigError;

const APP_DIR: &str = "dapper";

/// Standard directories for dapper's files.
pub trait DapperPaths: Send + Sync {
    /// Configuration directory (`~/.config/dapper` on Linux).
    fn config_dir(&self) -> PathBuf;
    /// Data directory (`~/.local/share/dapper` on Linux).
    fn data_dir(&self) -> PathBuf;
    /// Log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// The user's home directory.
    fn home_dir(&self) -> PathBuf;
}

/// [`DapperPaths`] backed by the `dirs` crate, with `$HOME` as fallback.
#[derive(Debug, Clone)]
pub struct DefaultPaths {
    home: PathBuf,
    config_base: PathBuf,
    data_base: PathBuf,
}

impl DefaultPaths {
    /// Resolve the platform directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or(ConfigError::NoHomeDir)?;
        let config_base = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        let data_base = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
        Ok(Self {
            home,
            config_base,
            data_base,
        })
    }

    /// Paths rooted under `root`; used by tests and portable installs.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_base: root.join("config"),
            data_base: root.join("data"),
            home: root,
        }
    }
}

impl DapperPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.config_base.join(APP_DIR)
    }

    fn data_dir(&self) -> PathBuf {
        self.data_base.join(APP_DIR)
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}
