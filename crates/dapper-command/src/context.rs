//! The debugger interface commands run against.
//!
//! [`DebuggerInterface`] owns the active [`DebuggerSession`] slot and the
//! breakpoints that outlive it. Only the dispatcher holds it, so the
//! session can only be replaced between command executions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dapper_dap::{
    AdapterConnector, Breakpoint, BreakpointManager, Connection, DebuggerSession, SessionId,
    SessionOptions, SessionState,
};
use dapper_provider::{DebugTarget, ProviderRegistry, Resolution};

use crate::command::CommandTable;
use crate::error::CommandError;

/// Session slot plus everything needed to fill it.
pub struct DebuggerInterface {
    registry: Arc<ProviderRegistry>,
    connector: Arc<dyn AdapterConnector>,
    options: SessionOptions,
    default_connection: Arc<Connection>,
    breakpoints: BreakpointManager,
    session: Option<DebuggerSession>,
    runtime: Option<String>,
    commands: Arc<CommandTable>,
}

impl DebuggerInterface {
    /// Interface with no active session, targeting the local machine.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        connector: Arc<dyn AdapterConnector>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            connector,
            options,
            default_connection: Arc::new(Connection::local()),
            breakpoints: BreakpointManager::new(),
            session: None,
            runtime: None,
            commands: Arc::new(CommandTable::new()),
        }
    }

    /// Use `connection` for commands that do not name one.
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.default_connection = Arc::new(connection);
        self
    }

    /// The table the owning dispatcher runs; empty until one is installed.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub(crate) fn install_commands(&mut self, table: Arc<CommandTable>) {
        self.commands = table;
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn default_connection(&self) -> &Arc<Connection> {
        &self.default_connection
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&DebuggerSession> {
        self.session.as_ref()
    }

    /// The active session or [`CommandError::NoSession`].
    pub fn active(&self) -> Result<&DebuggerSession, CommandError> {
        self.session.as_ref().ok_or(CommandError::NoSession)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(DebuggerSession::id)
    }

    /// Runtime of the active session.
    pub fn runtime(&self) -> Option<&str> {
        self.runtime.as_deref()
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Lifecycle state of the slot; `Disconnected` when empty.
    pub async fn state(&self) -> SessionState {
        match &self.session {
            Some(session) => session.state().await,
            None => SessionState::Disconnected,
        }
    }

    /// Resolve `runtime` for `connection` and start a session on `target`,
    /// replacing the active one.
    ///
    /// The previous session is terminated first. On failure the slot is
    /// left empty.
    pub async fn start(
        &mut self,
        runtime: &str,
        connection: Arc<Connection>,
        target: &DebugTarget,
    ) -> Result<SessionId, CommandError> {
        let provider = match self.registry.resolve(runtime, &connection).await? {
            Resolution::Offered(provider) => provider,
            Resolution::NotOffered => return Err(CommandError::NotOffered(runtime.to_string())),
        };
        let launch = provider.launch_request(target)?;

        self.close_active().await;

        let session = DebuggerSession::connect(
            self.connector.as_ref(),
            connection,
            launch,
            &mut self.breakpoints,
            self.options.clone(),
        )
        .await?;
        let id = session.id();
        tracing::info!(session = %id, runtime, "session started");
        self.session = Some(session);
        self.runtime = Some(runtime.to_string());
        Ok(id)
    }

    /// Replace the active session with a fresh one on the same target.
    ///
    /// Returns the previous and new identifiers. On failure the slot is
    /// left empty.
    pub async fn relaunch(&mut self) -> Result<(SessionId, SessionId), CommandError> {
        let session = self.session.take().ok_or(CommandError::NoSession)?;
        let previous = session.id();
        match session
            .relaunch(self.connector.as_ref(), &mut self.breakpoints)
            .await
        {
            Ok(next) => {
                let id = next.id();
                self.session = Some(next);
                Ok((previous, id))
            }
            Err(e) => {
                self.runtime = None;
                Err(e.into())
            }
        }
    }

    /// Terminate and drop the active session.
    pub async fn terminate(&mut self) -> Result<SessionId, CommandError> {
        let mut session = self.session.take().ok_or(CommandError::NoSession)?;
        self.runtime = None;
        let id = session.id();
        session.terminate().await?;
        Ok(id)
    }

    /// Best-effort teardown of whatever session is active.
    pub async fn close_active(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.terminate().await {
                tracing::warn!(session = %session.id(), error = %e, "terminate failed during teardown");
            }
        }
        self.runtime = None;
    }

    /// Thread execution commands act on: the last stopped one, else the
    /// first the adapter reports.
    pub async fn current_thread(&self, action: &'static str) -> Result<i64, CommandError> {
        let session = self.active()?;
        if let Some(thread) = session.stopped_thread().await {
            return Ok(thread);
        }
        let threads = session.threads().await?;
        threads
            .first()
            .map(|t| t.id)
            .ok_or(CommandError::NoThread(action))
    }

    /// Add a breakpoint and push the file's set to a live session.
    ///
    /// Returns whether the breakpoint is bound by the adapter.
    pub async fn add_breakpoint(
        &mut self,
        path: PathBuf,
        line: i64,
        condition: Option<String>,
    ) -> Result<bool, CommandError> {
        let mut bp = Breakpoint::new(path.clone(), line);
        if let Some(condition) = condition {
            bp = bp.with_condition(condition);
        }
        self.breakpoints.add(bp);
        self.sync_file(&path).await?;
        Ok(self
            .breakpoints
            .get_for_file(&path)
            .iter()
            .any(|b| b.line == line && b.verified))
    }

    /// Remove a breakpoint; `false` if there was none at that line.
    pub async fn remove_breakpoint(&mut self, path: &Path, line: i64) -> Result<bool, CommandError> {
        if !self.breakpoints.remove(path, line) {
            return Ok(false);
        }
        self.sync_file(path).await?;
        Ok(true)
    }

    async fn sync_file(&mut self, path: &Path) -> Result<(), CommandError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if !session.state().await.is_live() {
            return Ok(());
        }
        let responses = session
            .set_breakpoints(path, self.breakpoints.source_breakpoints(path))
            .await?;
        self.breakpoints.apply_response(path, &responses);
        Ok(())
    }
}

impl std::fmt::Debug for DebuggerInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerInterface")
            .field("session", &self.session_id())
            .field("runtime", &self.runtime)
            .field("connection", &self.default_connection)
            .field("breakpoints", &self.breakpoints.len())
            .finish()
    }
}
