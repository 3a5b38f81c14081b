//! Command layer error types.

use dapper_dap::DapError;
use dapper_provider::ProviderError;
use thiserror::Error;

/// Errors reported to whoever submitted a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command token is not in the table.
    #[error("unknown command '{name}'{hint}", hint = suggestion_hint(.suggestions))]
    UnknownCommand {
        /// Token as typed.
        name: String,
        /// Close matches from the table.
        suggestions: Vec<String>,
    },

    /// A command with this name is already in the table.
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    /// Arguments did not match the command's usage.
    #[error("usage: {usage}")]
    Usage {
        /// The expected invocation.
        usage: &'static str,
    },

    /// The command needs a session and none is active.
    #[error("no active session (use 'launch' or 'attach')")]
    NoSession,

    /// The adapter reported no thread to act on.
    #[error("no thread to {0}")]
    NoThread(&'static str),

    /// The runtime exists but is not offered on this build.
    #[error("runtime '{0}' is not offered")]
    NotOffered(String),

    /// A remote trigger could not be understood.
    #[error("malformed trigger: {0}")]
    MalformedTrigger(String),

    /// The dispatcher worker has stopped.
    #[error("command dispatcher has shut down")]
    DispatcherClosed,

    /// The trigger listener could not be set up.
    #[error("trigger listener failed: {0}")]
    Listener(#[source] std::io::Error),

    /// Failure from the active session or its adapter.
    #[error(transparent)]
    Dap(#[from] DapError),

    /// Failure from provider resolution.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_unknown_command_display() {
        let err = CommandError::UnknownCommand {
            name: "foo".into(),
            suggestions: Vec::new(),
        };
        assert_eq!(err.to_string(), "unknown command 'foo'");
    }

    #[test]
    fn error_unknown_command_lists_suggestions() {
        let err = CommandError::UnknownCommand {
            name: "stpe".into(),
            suggestions: vec!["step".into(), "status".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown command 'stpe' (did you mean: step, status?)"
        );
    }

    #[test]
    fn error_usage_display() {
        let err = CommandError::Usage {
            usage: "break <file>:<line> [condition]",
        };
        assert_eq!(err.to_string(), "usage: break <file>:<line> [condition]");
    }

    #[test]
    fn error_dap_is_transparent() {
        let err: CommandError = DapError::AdapterUnresponsive {
            command: "threads".into(),
            timeout_ms: 100,
        }
        .into();
        assert!(err.to_string().contains("timed out"));

        let err: CommandError = DapError::Rejected {
            command: "next".into(),
            message: "not stopped".into(),
        }
        .into();
        assert!(err.to_string().contains("rejected"));
        assert!(err.to_string().contains("not stopped"));
    }

    #[test]
    fn error_provider_is_transparent() {
        let err: CommandError = ProviderError::UnknownRuntime("cobol".into()).into();
        assert_eq!(err.to_string(), "no provider registered for runtime 'cobol'");
    }

    #[test]
    fn error_no_session_display() {
        assert!(CommandError::NoSession.to_string().contains("no active session"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandError>();
    }
}
