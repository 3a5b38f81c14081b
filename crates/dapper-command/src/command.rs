//! The command table.
//!
//! A command is a plain function-table entry: name, one-line help, usage
//! and an async `execute` function run against the [`DebuggerInterface`].
//! Lookup is an exact, case-sensitive match on the name.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use dapper_dap::Connection;
use dapper_provider::DebugTarget;

use crate::context::DebuggerInterface;
use crate::error::CommandError;
use crate::parse::{parse_location, suggest};

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Text for the user.
    Message(String),
    /// Nothing to report.
    Silent,
    /// The user asked to leave.
    Exit,
}

impl Outcome {
    fn message(text: impl Into<String>) -> Self {
        Outcome::Message(text.into())
    }
}

/// Boxed future returned by a command's `execute`.
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, CommandError>> + Send + 'a>>;

/// Signature of a command's `execute`.
pub type ExecuteFn = for<'a> fn(&'a mut DebuggerInterface, &'a [String]) -> CommandFuture<'a>;

/// One entry in the command table.
#[derive(Clone, Copy)]
pub struct Command {
    /// Unique lowercase invocation token.
    pub name: &'static str,
    /// One-line description.
    pub help: &'static str,
    /// Invocation synopsis shown on misuse.
    pub usage: &'static str,
    execute: ExecuteFn,
}

impl Command {
    pub const fn new(
        name: &'static str,
        help: &'static str,
        usage: &'static str,
        execute: ExecuteFn,
    ) -> Self {
        Self {
            name,
            help,
            usage,
            execute,
        }
    }

    /// Run the command.
    pub fn execute<'a>(
        &self,
        interface: &'a mut DebuggerInterface,
        args: &'a [String],
    ) -> CommandFuture<'a> {
        (self.execute)(interface, args)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("help", &self.help)
            .finish()
    }
}

/// Name-indexed commands; immutable once handed to a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in command.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for command in BUILTIN {
            table.commands.insert(command.name, *command);
        }
        table
    }

    /// Table holding only the named built-ins; unknown names are skipped.
    pub fn builtin_subset(names: &[&str]) -> Self {
        let mut table = Self::new();
        for command in BUILTIN.iter().filter(|c| names.contains(&c.name)) {
            table.commands.insert(command.name, *command);
        }
        table
    }

    /// Add `command`; names must be unique.
    pub fn register(&mut self, command: Command) -> Result<(), CommandError> {
        if self.commands.contains_key(command.name) {
            return Err(CommandError::DuplicateCommand(command.name.to_string()));
        }
        self.commands.insert(command.name, command);
        Ok(())
    }

    /// Exact lookup.
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Exact lookup, or `UnknownCommand` with suggestions.
    pub fn lookup(&self, name: &str) -> Result<&Command, CommandError> {
        self.get(name).ok_or_else(|| CommandError::UnknownCommand {
            name: name.to_string(),
            suggestions: suggest(name, self.names()),
        })
    }

    /// Command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// `name  help` lines for every command.
    pub fn help_text(&self) -> String {
        let width = self.names().map(str::len).max().unwrap_or(0);
        let mut out = String::new();
        for command in self.commands.values() {
            let _ = writeln!(out, "  {:width$}  {}", command.name, command.help);
        }
        out.trim_end().to_string()
    }
}

const LAUNCH_USAGE: &str = "launch <runtime> <program> [args..]";
const ATTACH_USAGE: &str = "attach <runtime> <pid|:port|host:port>";
const BREAK_USAGE: &str = "break <file>:<line> [condition]";
const CLEAR_USAGE: &str = "clear <file>:<line>";

static BUILTIN: &[Command] = &[
    Command::new("help", "List commands, or show usage for one.", "help [command]", cmd_help),
    Command::new(
        "launch",
        "Launch a program under the debugger.",
        LAUNCH_USAGE,
        cmd_launch,
    ),
    Command::new(
        "attach",
        "Attach to a running process or debug port.",
        ATTACH_USAGE,
        cmd_attach,
    ),
    Command::new("restart", "Restart the current target.", "restart", cmd_restart),
    Command::new("continue", "Resume execution.", "continue", cmd_continue),
    Command::new("next", "Step over the current line.", "next", cmd_next),
    Command::new("step", "Step into the current call.", "step", cmd_step),
    Command::new("out", "Step out of the current function.", "out", cmd_out),
    Command::new("pause", "Suspend the running target.", "pause", cmd_pause),
    Command::new(
        "break",
        "Set a breakpoint.",
        BREAK_USAGE,
        cmd_break,
    ),
    Command::new("clear", "Remove a breakpoint.", CLEAR_USAGE, cmd_clear),
    Command::new("threads", "List debuggee threads.", "threads", cmd_threads),
    Command::new("status", "Show the session state.", "status", cmd_status),
    Command::new("terminate", "End the current target.", "terminate", cmd_terminate),
    Command::new("quit", "Terminate the target and exit.", "quit", cmd_quit),
];

fn usage(usage: &'static str) -> CommandError {
    CommandError::Usage { usage }
}

/// Lists the table the interface was installed into, not the built-ins.
fn cmd_help<'a>(iface: &'a mut DebuggerInterface, args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let table = iface.commands();
        match args.first() {
            Some(name) => {
                let command = table.lookup(name)?;
                Ok(Outcome::message(format!(
                    "{}\n  usage: {}",
                    command.help, command.usage
                )))
            }
            None => Ok(Outcome::message(table.help_text())),
        }
    })
}

fn cmd_launch<'a>(iface: &'a mut DebuggerInterface, args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let [runtime, program, rest @ ..] = args else {
            return Err(usage(LAUNCH_USAGE));
        };
        let target = DebugTarget::launch(program.clone(), rest.iter().cloned());
        let connection = Arc::clone(iface.default_connection());
        let id = iface.start(runtime, connection, &target).await?;
        Ok(Outcome::message(format!("session {id} launched {program}")))
    })
}

fn cmd_attach<'a>(iface: &'a mut DebuggerInterface, args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let [runtime, endpoint] = args else {
            return Err(usage(ATTACH_USAGE));
        };
        let (connection, target) = if let Ok(pid) = endpoint.parse::<u32>() {
            (Arc::clone(iface.default_connection()), DebugTarget::attach_pid(pid))
        } else if let Some(port) = endpoint.strip_prefix(':') {
            let port = port.parse::<u16>().map_err(|_| usage(ATTACH_USAGE))?;
            (Arc::clone(iface.default_connection()), DebugTarget::attach_port(port))
        } else {
            let connection = Connection::parse(endpoint)?;
            let port = connection.port().ok_or_else(|| usage(ATTACH_USAGE))?;
            (Arc::new(connection), DebugTarget::attach_port(port))
        };
        let id = iface.start(runtime, connection, &target).await?;
        Ok(Outcome::message(format!("session {id} attached to {endpoint}")))
    })
}

fn cmd_restart<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let (previous, next) = iface.relaunch().await?;
        Ok(Outcome::message(format!("restarted: {previous} -> {next}")))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Continue,
    StepOver,
    StepIn,
    StepOut,
}

impl Resume {
    fn label(self) -> &'static str {
        match self {
            Resume::Continue => "continue",
            Resume::StepOver => "step over",
            Resume::StepIn => "step in",
            Resume::StepOut => "step out",
        }
    }
}

async fn resume(iface: &mut DebuggerInterface, action: Resume) -> Result<Outcome, CommandError> {
    let thread = iface.current_thread(action.label()).await?;
    let session = iface.active()?;
    match action {
        Resume::Continue => session.continue_execution(thread).await?,
        Resume::StepOver => session.next(thread).await?,
        Resume::StepIn => session.step_in(thread).await?,
        Resume::StepOut => session.step_out(thread).await?,
    }
    Ok(Outcome::Silent)
}

fn cmd_continue<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(resume(iface, Resume::Continue))
}

fn cmd_next<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(resume(iface, Resume::StepOver))
}

fn cmd_step<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(resume(iface, Resume::StepIn))
}

fn cmd_out<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(resume(iface, Resume::StepOut))
}

fn cmd_pause<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let session = iface.active()?;
        let threads = session.threads().await?;
        let thread = threads.first().map(|t| t.id).ok_or(CommandError::NoThread("pause"))?;
        session.pause(thread).await?;
        Ok(Outcome::Silent)
    })
}

fn cmd_break<'a>(iface: &'a mut DebuggerInterface, args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let Some((location, condition)) = args.split_first() else {
            return Err(usage(BREAK_USAGE));
        };
        let (file, line) = parse_location(location).ok_or_else(|| usage(BREAK_USAGE))?;
        let condition = (!condition.is_empty()).then(|| condition.join(" "));
        let verified = iface
            .add_breakpoint(PathBuf::from(&file), line, condition)
            .await?;
        let note = if verified { "" } else { " (pending)" };
        Ok(Outcome::message(format!("breakpoint at {file}:{line}{note}")))
    })
}

fn cmd_clear<'a>(iface: &'a mut DebuggerInterface, args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let [location] = args else {
            return Err(usage(CLEAR_USAGE));
        };
        let (file, line) = parse_location(location).ok_or_else(|| usage(CLEAR_USAGE))?;
        if iface.remove_breakpoint(&PathBuf::from(&file), line).await? {
            Ok(Outcome::message(format!("cleared {file}:{line}")))
        } else {
            Ok(Outcome::message(format!("no breakpoint at {file}:{line}")))
        }
    })
}

fn cmd_threads<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let session = iface.active()?;
        let stopped = session.stopped_thread().await;
        let mut out = String::new();
        for thread in session.threads().await? {
            let marker = if stopped == Some(thread.id) { '*' } else { ' ' };
            let _ = writeln!(out, "{marker} {:>4}  {}", thread.id, thread.name);
        }
        Ok(Outcome::message(out.trim_end().to_string()))
    })
}

fn cmd_status<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let Some(session) = iface.session() else {
            return Ok(Outcome::message(format!(
                "disconnected, {} breakpoint(s)",
                iface.breakpoints().len()
            )));
        };
        let mut out = format!(
            "session {} ({}) {} on {}",
            session.id(),
            iface.runtime().unwrap_or("?"),
            session.state().await,
            session.connection()
        );
        if let Some(code) = session.exit_code().await {
            let _ = write!(out, ", exited with {code}");
        }
        let _ = write!(out, ", {} breakpoint(s)", iface.breakpoints().len());
        Ok(Outcome::Message(out))
    })
}

fn cmd_terminate<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        let id = iface.terminate().await?;
        Ok(Outcome::message(format!("session {id} terminated")))
    })
}

fn cmd_quit<'a>(iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
    Box::pin(async move {
        iface.close_active().await;
        Ok(Outcome::Exit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dapper_dap::testing::{FakeConnector, FakeScript};
    use dapper_dap::{SessionOptions, SessionState};
    use dapper_provider::{register_builtin, AdapterOverrides, Gate, ProviderRegistry};

    fn interface(connector: Arc<FakeConnector>) -> DebuggerInterface {
        let mut registry = ProviderRegistry::new();
        register_builtin(&mut registry, &AdapterOverrides::new(), Gate::Never).unwrap();
        DebuggerInterface::new(Arc::new(registry), connector, SessionOptions::default())
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn run(
        table: &CommandTable,
        iface: &mut DebuggerInterface,
        name: &str,
        list: &[&str],
    ) -> Result<Outcome, CommandError> {
        let args = args(list);
        iface.install_commands(Arc::new(table.clone()));
        table.lookup(name)?.execute(iface, &args).await
    }

    fn entry(name: &str) -> Command {
        *BUILTIN.iter().find(|c| c.name == name).unwrap()
    }

    async fn wait_for(iface: &DebuggerInterface, state: SessionState) {
        for _ in 0..200 {
            if iface.state().await == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached {state}");
    }

    #[test]
    fn builtin_table_has_every_command() {
        let table = CommandTable::builtin();
        assert_eq!(table.len(), BUILTIN.len());
        for name in [
            "help", "launch", "attach", "restart", "continue", "next", "step", "out", "pause",
            "break", "clear", "threads", "status", "terminate", "quit",
        ] {
            assert!(table.get(name).is_some(), "missing {name}");
        }
        assert_eq!(table.get("restart").unwrap().help, "Restart the current target.");
    }

    #[test]
    fn names_are_lowercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for command in BUILTIN {
            assert_eq!(command.name, command.name.to_lowercase());
            assert!(seen.insert(command.name));
        }
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let table = CommandTable::builtin();
        assert!(table.lookup("restart").is_ok());
        assert!(matches!(
            table.lookup("Restart"),
            Err(CommandError::UnknownCommand { .. })
        ));
        assert!(matches!(
            table.lookup("rest"),
            Err(CommandError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn unknown_command_suggests_close_names() {
        let table = CommandTable::builtin();
        let Err(CommandError::UnknownCommand { suggestions, .. }) = table.lookup("contnue") else {
            panic!("expected UnknownCommand");
        };
        assert_eq!(suggestions, vec!["continue"]);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut table = CommandTable::builtin_subset(&["restart"]);
        assert_eq!(table.len(), 1);
        let err = table.register(entry("restart")).unwrap_err();
        assert!(matches!(err, CommandError::DuplicateCommand(ref n) if n == "restart"));
        assert!(table.register(entry("status")).is_ok());
    }

    #[test]
    fn help_text_lists_every_command() {
        let text = CommandTable::builtin().help_text();
        assert_eq!(text.lines().count(), BUILTIN.len());
        assert!(text.contains("restart"));
        assert!(text.contains("Restart the current target."));
    }

    #[tokio::test]
    async fn help_for_one_command_shows_usage() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        let outcome = run(&table, &mut iface, "help", &["break"]).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Message(
                "Set a breakpoint.\n  usage: break <file>:<line> [condition]".into()
            )
        );
    }

    #[tokio::test]
    async fn help_lists_only_installed_commands() {
        let table = CommandTable::builtin_subset(&["restart", "help"]);
        let mut iface = interface(Arc::new(FakeConnector::new()));

        let Outcome::Message(text) = run(&table, &mut iface, "help", &[]).await.unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(text.lines().count(), 2, "{text}");
        assert!(text.contains("restart"));
        assert!(!text.contains("launch"));

        let err = run(&table, &mut iface, "help", &["launch"]).await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand { ref name, .. } if name == "launch"));
    }

    fn cmd_ping<'a>(_iface: &'a mut DebuggerInterface, _args: &'a [String]) -> CommandFuture<'a> {
        Box::pin(async { Ok(Outcome::message("pong")) })
    }

    #[tokio::test]
    async fn help_describes_registered_commands() {
        let mut table = CommandTable::builtin_subset(&["help"]);
        table
            .register(Command::new("ping", "Answer pong.", "ping", cmd_ping))
            .unwrap();
        let mut iface = interface(Arc::new(FakeConnector::new()));

        let outcome = run(&table, &mut iface, "help", &["ping"]).await.unwrap();
        assert_eq!(outcome, Outcome::Message("Answer pong.\n  usage: ping".into()));
    }

    #[tokio::test]
    async fn launch_then_status() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));

        let Outcome::Message(text) = run(&table, &mut iface, "launch", &["python", "app.py", "-v"])
            .await
            .unwrap()
        else {
            panic!("expected a message");
        };
        assert!(text.contains("launched app.py"));

        let Outcome::Message(status) = run(&table, &mut iface, "status", &[]).await.unwrap() else {
            panic!("expected a message");
        };
        assert!(status.contains("(python) running on local"));
    }

    #[tokio::test]
    async fn launch_needs_runtime_and_program() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        let err = run(&table, &mut iface, "launch", &["python"]).await.unwrap_err();
        assert_eq!(err.to_string(), "usage: launch <runtime> <program> [args..]");
    }

    #[tokio::test]
    async fn attach_forms() {
        let connector = Arc::new(FakeConnector::new());
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::clone(&connector));

        run(&table, &mut iface, "attach", &["node", "4242"]).await.unwrap();
        let attach = connector
            .last_adapter()
            .unwrap()
            .requests()
            .into_iter()
            .find(|r| r.command == "attach")
            .unwrap();
        assert_eq!(attach.arguments.unwrap()["processId"], 4242);

        run(&table, &mut iface, "attach", &["python", "devbox:5678"])
            .await
            .unwrap();
        assert_eq!(iface.session().unwrap().connection().to_string(), "devbox:5678");

        let err = run(&table, &mut iface, "attach", &["python", "devbox"])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Usage { .. }));
    }

    #[tokio::test]
    async fn restart_reports_new_id() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        run(&table, &mut iface, "launch", &["node", "main.js"]).await.unwrap();
        let before = iface.session_id().unwrap();

        let outcome = run(&table, &mut iface, "restart", &[]).await.unwrap();
        let after = iface.session_id().unwrap();
        assert_ne!(before, after);
        assert_eq!(
            outcome,
            Outcome::Message(format!("restarted: {before} -> {after}"))
        );
    }

    #[tokio::test]
    async fn stepping_from_entry() {
        let connector = Arc::new(FakeConnector::with_script(FakeScript::default().stop_on_entry()));
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::clone(&connector));
        run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
        wait_for(&iface, SessionState::Paused).await;

        assert_eq!(run(&table, &mut iface, "next", &[]).await.unwrap(), Outcome::Silent);
        wait_for(&iface, SessionState::Paused).await;
        run(&table, &mut iface, "step", &[]).await.unwrap();
        wait_for(&iface, SessionState::Paused).await;
        run(&table, &mut iface, "out", &[]).await.unwrap();
        wait_for(&iface, SessionState::Paused).await;
        run(&table, &mut iface, "continue", &[]).await.unwrap();
        wait_for(&iface, SessionState::Running).await;

        let commands = connector.last_adapter().unwrap().commands();
        for expected in ["next", "stepIn", "stepOut", "continue"] {
            assert!(commands.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn each_resume_command_sends_its_own_request() {
        let requests = ["continue", "next", "stepIn", "stepOut"];
        for (name, expected) in [
            ("continue", "continue"),
            ("next", "next"),
            ("step", "stepIn"),
            ("out", "stepOut"),
        ] {
            let connector =
                Arc::new(FakeConnector::with_script(FakeScript::default().stop_on_entry()));
            let table = CommandTable::builtin();
            let mut iface = interface(Arc::clone(&connector));
            run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
            wait_for(&iface, SessionState::Paused).await;

            run(&table, &mut iface, name, &[]).await.unwrap();
            let sent: Vec<String> = connector
                .last_adapter()
                .unwrap()
                .commands()
                .into_iter()
                .filter(|c| requests.contains(&c.as_str()))
                .collect();
            assert_eq!(sent, vec![expected.to_string()], "{name}");
        }
    }

    #[tokio::test]
    async fn pause_running_target() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
        run(&table, &mut iface, "pause", &[]).await.unwrap();
        wait_for(&iface, SessionState::Paused).await;

        let Outcome::Message(threads) = run(&table, &mut iface, "threads", &[]).await.unwrap()
        else {
            panic!("expected a message");
        };
        assert_eq!(threads, "*    1  main");
    }

    #[tokio::test]
    async fn commands_without_session_fail() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        for name in ["restart", "continue", "next", "pause", "threads", "terminate"] {
            let err = run(&table, &mut iface, name, &[]).await.unwrap_err();
            assert!(matches!(err, CommandError::NoSession), "{name}: {err}");
        }
    }

    #[tokio::test]
    async fn break_and_clear_without_session() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));

        let outcome = run(&table, &mut iface, "break", &["app.py:12", "x", ">", "3"])
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Message("breakpoint at app.py:12 (pending)".into()));
        let bp = &iface.breakpoints().get_for_file(std::path::Path::new("app.py"))[0];
        assert_eq!(bp.condition.as_deref(), Some("x > 3"));

        let outcome = run(&table, &mut iface, "clear", &["app.py:12"]).await.unwrap();
        assert_eq!(outcome, Outcome::Message("cleared app.py:12".into()));
        let outcome = run(&table, &mut iface, "clear", &["app.py:12"]).await.unwrap();
        assert_eq!(outcome, Outcome::Message("no breakpoint at app.py:12".into()));

        let err = run(&table, &mut iface, "break", &["app.py"]).await.unwrap_err();
        assert!(matches!(err, CommandError::Usage { .. }));
    }

    #[tokio::test]
    async fn terminate_and_quit() {
        let table = CommandTable::builtin();
        let mut iface = interface(Arc::new(FakeConnector::new()));
        run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
        let id = iface.session_id().unwrap();

        let outcome = run(&table, &mut iface, "terminate", &[]).await.unwrap();
        assert_eq!(outcome, Outcome::Message(format!("session {id} terminated")));

        run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
        assert_eq!(run(&table, &mut iface, "quit", &[]).await.unwrap(), Outcome::Exit);
        assert!(iface.session().is_none());
    }

    #[tokio::test]
    async fn rejected_step_reports_adapter_message() {
        let connector = Arc::new(FakeConnector::with_script(
            FakeScript::default().stop_on_entry().reject("next", "frame is not steppable"),
        ));
        let table = CommandTable::builtin();
        let mut iface = interface(connector);
        run(&table, &mut iface, "launch", &["python", "app.py"]).await.unwrap();
        wait_for(&iface, SessionState::Paused).await;

        let err = run(&table, &mut iface, "next", &[]).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("rejected"));
        assert!(text.contains("frame is not steppable"));
        assert_eq!(iface.state().await, SessionState::Paused);
    }
}
