use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive name understood by `tracing-subscriber`.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Request deadlines and adapter liveness policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound for a single adapter request (100–600000 ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consecutive timeouts before the adapter is presumed dead (>= 1).
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,
    /// Upper bound for each launch/attach handshake step (100–600000 ms).
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_consecutive_timeouts() -> u32 {
    2
}
fn default_launch_timeout_ms() -> u64 {
    30_000
}

impl SessionConfig {
    /// Request deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Handshake deadline as a [`Duration`].
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            launch_timeout_ms: default_launch_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Remote trigger listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Accept remote debug triggers.
    #[serde(default)]
    pub enabled: bool,
    /// Socket address to bind.
    #[serde(default = "default_listener_address")]
    pub address: String,
}

fn default_listener_address() -> String {
    "127.0.0.1:9615".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_listener_address(),
        }
    }
}

/// Experiment flags consulted by provider gates.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Offer the React Native debugger.
    #[serde(default)]
    pub reactnative_debugger: bool,
}

/// Build identity probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Proprietary companion module; its absence marks an open-source build.
    #[serde(default = "default_companion_module")]
    pub companion_module: PathBuf,
}

fn default_companion_module() -> PathBuf {
    PathBuf::from("/opt/dapper/internal/companion.js")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            companion_module: default_companion_module(),
        }
    }
}

/// Override for the adapter command of one runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEntry {
    /// The command to run the adapter.
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Top-level dapper configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session deadlines.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Remote trigger listener.
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Experiment flags.
    #[serde(default)]
    pub features: FeatureFlags,
    /// Build identity.
    #[serde(default)]
    pub build: BuildConfig,
    /// Per-runtime adapter overrides, keyed by runtime name.
    #[serde(default)]
    pub adapters: HashMap<String, AdapterEntry>,
}
