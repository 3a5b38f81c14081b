//! Adapter protocol error types.

use thiserror::Error;

/// Errors from debugger session and adapter operations.
#[derive(Debug, Error)]
pub enum DapError {
    /// Adapter process failed to start.
    #[error("adapter failed to start: {0}")]
    AdapterSpawnFailed(#[from] std::io::Error),

    /// Transport-level communication error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request received no response within its deadline.
    #[error("adapter unresponsive: '{command}' timed out after {timeout_ms}ms")]
    AdapterUnresponsive {
        /// The command that timed out.
        command: String,
        /// The deadline that expired.
        timeout_ms: u64,
    },

    /// Adapter answered a request with `success: false`.
    #[error("adapter rejected '{command}': {message}")]
    Rejected {
        /// The rejected command.
        command: String,
        /// The rejection message from the adapter.
        message: String,
    },

    /// Adapter refused the launch configuration.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// Adapter refused the attach configuration.
    #[error("attach failed: {0}")]
    AttachFailed(String),

    /// Adapter sent an invalid or unparseable message.
    #[error("adapter sent invalid message: {0}")]
    InvalidResponse(String),

    /// The transport closed while requests were outstanding.
    #[error("adapter disconnected")]
    AdapterDisconnected,

    /// The session is dead; no further requests are accepted.
    #[error("session terminated")]
    SessionTerminated,

    /// The session was superseded by a restart.
    #[error("session replaced by a newer session")]
    SessionReplaced,

    /// A connection descriptor could not be parsed.
    #[error("invalid connection descriptor '{0}'")]
    InvalidConnection(String),

    /// The operation is not valid in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Current state name.
        state: String,
    },
}

impl DapError {
    /// Whether this error came from a request deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DapError::AdapterUnresponsive { .. })
    }

    /// Whether this error means the session instance can no longer be used.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            DapError::AdapterDisconnected | DapError::SessionTerminated | DapError::SessionReplaced
        )
    }

    /// Re-create the error for fan-out to several waiters.
    ///
    /// `std::io::Error` is not `Clone`, so spawn failures degrade to
    /// [`DapError::Transport`] carrying the original text.
    pub fn duplicate(&self) -> DapError {
        match self {
            DapError::AdapterSpawnFailed(e) => DapError::Transport(e.to_string()),
            DapError::Transport(m) => DapError::Transport(m.clone()),
            DapError::AdapterUnresponsive {
                command,
                timeout_ms,
            } => DapError::AdapterUnresponsive {
                command: command.clone(),
                timeout_ms: *timeout_ms,
            },
            DapError::Rejected { command, message } => DapError::Rejected {
                command: command.clone(),
                message: message.clone(),
            },
            DapError::LaunchFailed(m) => DapError::LaunchFailed(m.clone()),
            DapError::AttachFailed(m) => DapError::AttachFailed(m.clone()),
            DapError::InvalidResponse(m) => DapError::InvalidResponse(m.clone()),
            DapError::AdapterDisconnected => DapError::AdapterDisconnected,
            DapError::SessionTerminated => DapError::SessionTerminated,
            DapError::SessionReplaced => DapError::SessionReplaced,
            DapError::InvalidConnection(d) => DapError::InvalidConnection(d.clone()),
            DapError::InvalidState { operation, state } => DapError::InvalidState {
                operation: *operation,
                state: state.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_adapter_spawn_failed_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "binary missing");
        let err = DapError::AdapterSpawnFailed(io_err);
        assert!(err.to_string().contains("adapter failed to start"));
        assert!(err.to_string().contains("binary missing"));
    }

    #[test]
    fn error_unresponsive_and_rejected_are_distinguishable() {
        let timeout = DapError::AdapterUnresponsive {
            command: "continue".into(),
            timeout_ms: 500,
        };
        let rejected = DapError::Rejected {
            command: "continue".into(),
            message: "not stopped".into(),
        };
        assert_eq!(
            timeout.to_string(),
            "adapter unresponsive: 'continue' timed out after 500ms"
        );
        assert_eq!(
            rejected.to_string(),
            "adapter rejected 'continue': not stopped"
        );
        assert!(timeout.is_timeout());
        assert!(!rejected.is_timeout());
    }

    #[test]
    fn error_launch_and_attach_display() {
        assert_eq!(
            DapError::LaunchFailed("no such program".into()).to_string(),
            "launch failed: no such program"
        );
        assert_eq!(
            DapError::AttachFailed("pid gone".into()).to_string(),
            "attach failed: pid gone"
        );
    }

    #[test]
    fn error_invalid_state_display() {
        let err = DapError::InvalidState {
            operation: "step",
            state: "running".into(),
        };
        assert_eq!(err.to_string(), "cannot step while session is running");
    }

    #[test]
    fn error_session_fatality() {
        assert!(DapError::AdapterDisconnected.is_fatal_to_session());
        assert!(DapError::SessionTerminated.is_fatal_to_session());
        assert!(DapError::SessionReplaced.is_fatal_to_session());
        assert!(!DapError::Transport("x".into()).is_fatal_to_session());
    }

    #[test]
    fn error_duplicate_keeps_spawn_text() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: DapError = io_err.into();
        assert!(matches!(err, DapError::AdapterSpawnFailed(_)));
        let copy = err.duplicate();
        assert!(matches!(copy, DapError::Transport(ref m) if m.contains("pipe broken")));
    }
}
