//! The launch/attach provider contract.

use std::sync::Arc;

use dapper_dap::{Connection, LaunchRequest, RequestKind};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// What the user wants to debug.
///
/// A target with a `program` is launched; one with a `pid` or `port` is
/// attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugTarget {
    /// Program or script to launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Program arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory for the launched program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Process to attach to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Debug port to attach to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl DebugTarget {
    /// Launch `program` with `args`.
    pub fn launch(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: Some(program.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Attach to a running process.
    pub fn attach_pid(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            ..Self::default()
        }
    }

    /// Attach to a debug port on the connection's host.
    pub fn attach_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    /// Launch or attach, or `None` when the target names nothing.
    pub fn request_kind(&self) -> Option<RequestKind> {
        if self.program.is_some() {
            Some(RequestKind::Launch)
        } else if self.pid.is_some() || self.port.is_some() {
            Some(RequestKind::Attach)
        } else {
            None
        }
    }
}

/// Runtime-specific strategy bound to one connection.
pub trait LaunchAttachProvider: Send + Sync {
    /// Registry key, e.g. `python`.
    fn runtime(&self) -> &str;

    /// Human-readable name, e.g. `Python`.
    fn display_name(&self) -> &str;

    /// The connection this provider was built for.
    fn connection(&self) -> &Arc<Connection>;

    /// Adapter configuration for `target`.
    fn launch_request(&self, target: &DebugTarget) -> Result<LaunchRequest, ProviderError>;
}
