//! dapper-command — textual debugger commands and their serialized
//! execution.
//!
//! Input lines are parsed against a [`CommandTable`] and executed one at a
//! time by a [`Dispatcher`] against the [`DebuggerInterface`], which owns
//! the active session. Remote triggers enter the same queue through a
//! [`RemoteCommandListener`].
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod parse;

pub use command::{Command, CommandFuture, CommandTable, ExecuteFn, Outcome};
pub use context::DebuggerInterface;
pub use dispatcher::{CommandResult, Dispatcher, DispatcherHandle, StartRequest};
pub use error::CommandError;
pub use listener::{ListenerHandle, RemoteCommandListener, Trigger, TriggerReply};
pub use parse::{parse_line, suggest, ParsedLine};
