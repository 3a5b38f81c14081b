//! Adapter launch configuration produced by providers.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Whether the session starts the debuggee or joins a running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Start the debuggee under the adapter.
    Launch,
    /// Attach to an already running debuggee.
    Attach,
}

impl RequestKind {
    /// Protocol command name for this kind.
    pub fn command(self) -> &'static str {
        match self {
            RequestKind::Launch => "launch",
            RequestKind::Attach => "attach",
        }
    }

    /// State a session enters while this request is in flight.
    pub fn starting_state(self) -> SessionState {
        match self {
            RequestKind::Launch => SessionState::Launching,
            RequestKind::Attach => SessionState::Attaching,
        }
    }
}

/// How to start (or reach) the debug adapter itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCommand {
    /// Identifier sent as `adapterID` during `initialize`.
    pub adapter_id: String,
    /// Executable to spawn for local connections.
    pub command: String,
    /// Arguments for the executable.
    #[serde(default)]
    pub args: Vec<String>,
}

impl AdapterCommand {
    /// Build an adapter command.
    pub fn new(
        adapter_id: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything a session needs to bring a debuggee under control.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    /// `launch` or `attach`.
    pub kind: RequestKind,
    /// Adapter to talk to.
    pub adapter: AdapterCommand,
    /// Runtime-specific arguments for the `launch`/`attach` request.
    pub arguments: serde_json::Value,
}
