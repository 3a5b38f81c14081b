//! Debugger session: one conversation with one debug adapter.
//!
//! A session owns the adapter transport, the pending-request table and the
//! lifecycle state. It is never reset in place. Restarting tears the old
//! session down (failing its outstanding requests with
//! [`DapError::SessionReplaced`]) and builds a new one with a fresh
//! [`SessionId`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::breakpoint::BreakpointManager;
use crate::connection::Connection;
use crate::connector::{AdapterConnector, AdapterStreams};
use crate::error::DapError;
use crate::launch::{LaunchRequest, RequestKind};
use crate::pending::{PendingRequests, Reply};
use crate::protocol::{
    BreakpointResponse, Capabilities, DisconnectArguments, Event, ExitedEventBody,
    InitializeRequestArguments, Message, OutputEventBody, Request, Response,
    SetBreakpointsArguments, SetBreakpointsResponseBody, Source, SourceBreakpoint,
    StoppedEventBody, Thread, ThreadArguments, ThreadsResponseBody,
};
use crate::transport::{encode_message, read_message};

/// Default per-request deadline (milliseconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Default bound on the launch/attach handshake (milliseconds).
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 30_000;
/// Consecutive timeouts after which the adapter is presumed dead.
pub const DEFAULT_MAX_CONSECUTIVE_TIMEOUTS: u32 = 2;

/// How long teardown waits for the final frames to reach the adapter.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);
const WRITER_QUEUE: usize = 64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No conversation with an adapter.
    Disconnected,
    /// `launch` handshake in progress.
    Launching,
    /// `attach` handshake in progress.
    Attaching,
    /// Debuggee is executing.
    Running,
    /// Debuggee is stopped (breakpoint, step, pause, entry).
    Paused,
    /// Shutting down; only teardown requests are meaningful.
    Terminating,
    /// Dead. Terminal.
    Terminated,
}

impl SessionState {
    /// Lowercase display name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Launching => "launching",
            SessionState::Attaching => "attaching",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Terminating => "terminating",
            SessionState::Terminated => "terminated",
        }
    }

    /// Whether a debuggee is being brought up or is under control.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Launching
                | SessionState::Attaching
                | SessionState::Running
                | SessionState::Paused
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// A session never goes back to `Launching`; restarting builds a new one.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Disconnected, Launching | Attaching) => true,
            (Launching | Attaching, Running | Paused | Terminating) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running | Paused, Terminating) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadlines and escalation policy for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Upper bound for any single request.
    pub request_timeout: Duration,
    /// Upper bound for the launch/attach handshake steps.
    pub launch_timeout: Duration,
    /// Consecutive timeouts that move the session to `Terminating`.
    pub max_consecutive_timeouts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            launch_timeout: Duration::from_millis(DEFAULT_LAUNCH_TIMEOUT_MS),
            max_consecutive_timeouts: DEFAULT_MAX_CONSECUTIVE_TIMEOUTS,
        }
    }
}

/// Callback invoked for every adapter event, in arrival order.
pub type EventObserver = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closure {
    Terminated,
    Replaced,
}

impl Closure {
    fn error(self) -> DapError {
        match self {
            Closure::Terminated => DapError::SessionTerminated,
            Closure::Replaced => DapError::SessionReplaced,
        }
    }
}

struct SessionCore {
    id: SessionId,
    state: SessionState,
    closure: Option<Closure>,
    pending: PendingRequests,
    consecutive_timeouts: u32,
    capabilities: Capabilities,
    exit_code: Option<i64>,
    stopped_thread: Option<i64>,
    observers: Vec<EventObserver>,
}

impl SessionCore {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Disconnected,
            closure: None,
            pending: PendingRequests::new(),
            consecutive_timeouts: 0,
            capabilities: Capabilities::default(),
            exit_code: None,
            stopped_thread: None,
            observers: Vec::new(),
        }
    }

    fn ensure_open(&self) -> Result<(), DapError> {
        match self.closure {
            Some(closure) => Err(closure.error()),
            None if self.state == SessionState::Terminated => Err(DapError::SessionTerminated),
            None => Ok(()),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), DapError> {
        self.ensure_open()?;
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DapError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::debug!(session = %self.id, from = %self.state, to = %next, "ignored state change");
            return false;
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "state change");
        self.state = next;
        true
    }
}

struct Shared {
    id: SessionId,
    core: Mutex<SessionCore>,
    initialized: watch::Sender<bool>,
}

impl Shared {
    async fn route(&self, message: Message) {
        match message {
            Message::Response(response) => {
                let mut core = self.core.lock().await;
                if core.pending.resolve(response) {
                    core.consecutive_timeouts = 0;
                }
            }
            Message::Event(event) => self.handle_event(event).await,
            Message::Request(request) => {
                tracing::debug!(session = %self.id, command = %request.command, "ignoring adapter request");
            }
        }
    }

    async fn handle_event(&self, event: Event) {
        let mut core = self.core.lock().await;
        match event.event.as_str() {
            "initialized" => {
                self.initialized.send_replace(true);
            }
            "stopped" => {
                let body: Option<StoppedEventBody> = decode_event(&event);
                if let Some(thread) = body.as_ref().and_then(|b| b.thread_id) {
                    core.stopped_thread = Some(thread);
                }
                core.transition(SessionState::Paused);
                tracing::info!(
                    session = %self.id,
                    reason = body.as_ref().map_or("unknown", |b| b.reason.as_str()),
                    "debuggee stopped"
                );
            }
            "continued" => {
                core.transition(SessionState::Running);
            }
            "terminated" => {
                if core.state.is_live() {
                    core.transition(SessionState::Terminating);
                }
            }
            "exited" => {
                if let Some(body) = decode_event::<ExitedEventBody>(&event) {
                    tracing::info!(session = %self.id, exit_code = body.exit_code, "debuggee exited");
                    core.exit_code = Some(body.exit_code);
                }
            }
            "output" => {
                if let Some(body) = decode_event::<OutputEventBody>(&event) {
                    tracing::debug!(session = %self.id, category = ?body.category, "{}", body.output.trim_end());
                }
            }
            _ => {}
        }
        for observer in &core.observers {
            observer(&event);
        }
    }

    async fn adapter_gone(&self) {
        let mut core = self.core.lock().await;
        let failed = core.pending.fail_all(&DapError::AdapterDisconnected);
        if core.closure.is_none() {
            core.closure = Some(Closure::Terminated);
            tracing::warn!(session = %self.id, failed, "adapter disconnected");
        }
        core.transition(SessionState::Terminated);
    }
}

fn decode_event<T: DeserializeOwned>(event: &Event) -> Option<T> {
    event
        .body
        .clone()
        .and_then(|body| serde_json::from_value(body).ok())
}

fn decode_body<T: DeserializeOwned>(command: &str, body: Option<Value>) -> Result<T, DapError> {
    let body =
        body.ok_or_else(|| DapError::InvalidResponse(format!("'{command}' response has no body")))?;
    serde_json::from_value(body)
        .map_err(|e| DapError::InvalidResponse(format!("'{command}' body: {e}")))
}

fn to_arguments<T: Serialize>(arguments: &T) -> Result<Value, DapError> {
    serde_json::to_value(arguments).map_err(|e| DapError::Transport(format!("encode arguments: {e}")))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A request that has been written and is awaiting its response.
struct InFlight {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<Reply>,
}

/// One conversation with a debug adapter.
pub struct DebuggerSession {
    id: SessionId,
    connection: Arc<Connection>,
    launch: LaunchRequest,
    options: SessionOptions,
    shared: Arc<Shared>,
    next_seq: AtomicI64,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl DebuggerSession {
    /// Open adapter streams through `connector` and run the handshake.
    pub async fn connect(
        connector: &dyn AdapterConnector,
        connection: Arc<Connection>,
        launch: LaunchRequest,
        breakpoints: &mut BreakpointManager,
        options: SessionOptions,
    ) -> Result<Self, DapError> {
        let streams = connector.connect(&connection, &launch.adapter).await?;
        Self::start(connection, launch, streams, breakpoints, options).await
    }

    /// Run the launch/attach handshake over already-open streams.
    ///
    /// Resolves once the debuggee is `Running` (or `Paused` on entry).
    /// Any failure tears the session down and surfaces as
    /// [`DapError::LaunchFailed`] or [`DapError::AttachFailed`].
    pub async fn start(
        connection: Arc<Connection>,
        launch: LaunchRequest,
        streams: AdapterStreams,
        breakpoints: &mut BreakpointManager,
        options: SessionOptions,
    ) -> Result<Self, DapError> {
        let mut session = Self::open(connection, launch, streams, options);
        match session.handshake(breakpoints).await {
            Ok(()) => Ok(session),
            Err(error) => {
                tracing::warn!(session = %session.id, error = %error, "handshake failed");
                session.shutdown(Closure::Terminated, true).await;
                let message = match error {
                    DapError::Rejected { message, .. } => message,
                    other => other.to_string(),
                };
                Err(match session.launch.kind {
                    RequestKind::Launch => DapError::LaunchFailed(message),
                    RequestKind::Attach => DapError::AttachFailed(message),
                })
            }
        }
    }

    fn open(
        connection: Arc<Connection>,
        launch: LaunchRequest,
        streams: AdapterStreams,
        options: SessionOptions,
    ) -> Self {
        let id = SessionId::next();
        let (initialized, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            id,
            core: Mutex::new(SessionCore::new(id)),
            initialized,
        });

        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE);
        let writer = tokio::spawn(write_loop(id, streams.writer, writer_rx));
        let reader = tokio::spawn(read_loop(streams.reader, Arc::clone(&shared)));

        tracing::info!(
            session = %id,
            %connection,
            kind = launch.kind.command(),
            adapter = %launch.adapter.adapter_id,
            "session opened"
        );

        Self {
            id,
            connection,
            launch,
            options,
            shared,
            next_seq: AtomicI64::new(1),
            writer_tx: Some(writer_tx),
            writer: Some(writer),
            reader,
            child: streams.child,
        }
    }

    /// The session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The connection this session talks to.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The configuration the session was started with.
    pub fn launch_request(&self) -> &LaunchRequest {
        &self.launch
    }

    /// Deadlines in effect.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.shared.core.lock().await.state
    }

    /// Capabilities reported by the adapter during `initialize`.
    pub async fn capabilities(&self) -> Capabilities {
        self.shared.core.lock().await.capabilities.clone()
    }

    /// Exit code from the adapter's `exited` event, if seen.
    pub async fn exit_code(&self) -> Option<i64> {
        self.shared.core.lock().await.exit_code
    }

    /// Thread named by the most recent `stopped` event.
    pub async fn stopped_thread(&self) -> Option<i64> {
        self.shared.core.lock().await.stopped_thread
    }

    /// Number of requests awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        self.shared.core.lock().await.pending.len()
    }

    /// Register an observer for adapter events.
    pub async fn on_event<F>(&self, observer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.core.lock().await.observers.push(Box::new(observer));
    }

    /// Send an arbitrary request and wait for its response body.
    ///
    /// Fails with [`DapError::Rejected`] on `success: false` and with
    /// [`DapError::AdapterUnresponsive`] when the deadline expires.
    pub async fn request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<Option<Value>, DapError> {
        let in_flight = self.send(command, arguments).await?;
        let response = self.await_reply(in_flight, self.options.request_timeout).await?;
        Ok(response.body)
    }

    /// Resume execution.
    pub async fn continue_execution(&self, thread_id: i64) -> Result<(), DapError> {
        self.resume("continue", "continue", thread_id).await
    }

    /// Step over.
    pub async fn next(&self, thread_id: i64) -> Result<(), DapError> {
        self.resume("step over", "next", thread_id).await
    }

    /// Step into.
    pub async fn step_in(&self, thread_id: i64) -> Result<(), DapError> {
        self.resume("step in", "stepIn", thread_id).await
    }

    /// Step out.
    pub async fn step_out(&self, thread_id: i64) -> Result<(), DapError> {
        self.resume("step out", "stepOut", thread_id).await
    }

    /// Ask the adapter to suspend a running thread. The state flips to
    /// `Paused` when the matching `stopped` event arrives.
    pub async fn pause(&self, thread_id: i64) -> Result<(), DapError> {
        self.require("pause", &[SessionState::Running]).await?;
        self.request("pause", Some(to_arguments(&ThreadArguments { thread_id })?))
            .await
            .map(|_| ())
    }

    /// List debuggee threads.
    pub async fn threads(&self) -> Result<Vec<Thread>, DapError> {
        self.require("list threads", &[SessionState::Running, SessionState::Paused])
            .await?;
        let body = self.request("threads", None).await?;
        let body: ThreadsResponseBody = decode_body("threads", body)?;
        Ok(body.threads)
    }

    /// Replace every breakpoint in `path` with `breakpoints`.
    pub async fn set_breakpoints(
        &self,
        path: &Path,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<BreakpointResponse>, DapError> {
        self.require(
            "set breakpoints",
            &[
                SessionState::Launching,
                SessionState::Attaching,
                SessionState::Running,
                SessionState::Paused,
            ],
        )
        .await?;
        self.send_breakpoints(path, breakpoints).await
    }

    /// End the debuggee and close the conversation. Idempotent.
    pub async fn terminate(&mut self) -> Result<(), DapError> {
        let supports_terminate = {
            let mut core = self.shared.core.lock().await;
            if core.ensure_open().is_err() {
                drop(core);
                self.shutdown(Closure::Terminated, false).await;
                return Ok(());
            }
            core.transition(SessionState::Terminating);
            core.capabilities.terminate()
        };

        let result = if supports_terminate {
            self.request("terminate", None).await
        } else {
            let arguments = DisconnectArguments {
                restart: None,
                terminate_debuggee: Some(true),
            };
            self.request("disconnect", Some(to_arguments(&arguments)?)).await
        };
        self.shutdown(Closure::Terminated, supports_terminate).await;
        result.map(|_| ())
    }

    /// Replace this session with a fresh one for the same connection and
    /// launch configuration.
    ///
    /// Outstanding requests fail with [`DapError::SessionReplaced`]. The
    /// returned session always carries a new identifier.
    pub async fn relaunch(
        mut self,
        connector: &dyn AdapterConnector,
        breakpoints: &mut BreakpointManager,
    ) -> Result<DebuggerSession, DapError> {
        let previous = self.id;
        tracing::info!(session = %previous, "relaunching");
        self.shutdown(Closure::Replaced, true).await;
        breakpoints.reset_verification();

        let connection = Arc::clone(&self.connection);
        let launch = self.launch.clone();
        let options = self.options.clone();
        drop(self);

        let next = Self::connect(connector, connection, launch, breakpoints, options).await?;
        tracing::info!(previous = %previous, session = %next.id, "relaunched");
        Ok(next)
    }

    // -----------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------

    async fn handshake(&self, breakpoints: &mut BreakpointManager) -> Result<(), DapError> {
        let kind = self.launch.kind;
        self.shared
            .core
            .lock()
            .await
            .transition(kind.starting_state());

        let initialize = InitializeRequestArguments::for_adapter(&self.launch.adapter.adapter_id);
        let body = self
            .request("initialize", Some(to_arguments(&initialize)?))
            .await?;
        let capabilities: Capabilities = body
            .and_then(|b| serde_json::from_value(b).ok())
            .unwrap_or_default();
        self.shared.core.lock().await.capabilities = capabilities.clone();

        let deadline = self.options.launch_timeout;
        let mut initialized = self.shared.initialized.subscribe();
        let mut launch = self
            .send(kind.command(), Some(self.launch.arguments.clone()))
            .await?;

        // Adapters may answer launch/attach before or after `initialized`.
        let early = timeout(deadline, async {
            tokio::select! {
                _ = initialized.wait_for(|ready| *ready) => None,
                reply = &mut launch.rx => Some(reply),
            }
        })
        .await;
        let answered = match early {
            Ok(Some(reply)) => {
                self.settle(&launch.command, reply)?;
                let waited = timeout(deadline, initialized.wait_for(|ready| *ready)).await;
                if !matches!(waited, Ok(Ok(_))) {
                    return Err(DapError::AdapterUnresponsive {
                        command: "initialized".into(),
                        timeout_ms: millis(deadline),
                    });
                }
                true
            }
            Ok(None) => false,
            Err(_) => return Err(self.expire(launch.seq, launch.command, deadline).await),
        };

        self.configure(breakpoints, &capabilities).await?;

        if !answered {
            self.await_reply(launch, deadline).await?;
        }

        let mut core = self.shared.core.lock().await;
        core.ensure_open()?;
        if core.state == kind.starting_state() {
            core.transition(SessionState::Running);
        }
        tracing::info!(session = %self.id, state = %core.state, "session ready");
        Ok(())
    }

    async fn configure(
        &self,
        breakpoints: &mut BreakpointManager,
        capabilities: &Capabilities,
    ) -> Result<(), DapError> {
        let files: Vec<PathBuf> = breakpoints.files().map(Path::to_path_buf).collect();
        for path in files {
            let wanted = breakpoints.source_breakpoints(&path);
            match self.send_breakpoints(&path, wanted).await {
                Ok(acks) => breakpoints.apply_response(&path, &acks),
                Err(e) if e.is_fatal_to_session() || e.is_timeout() => return Err(e),
                Err(e) => {
                    tracing::warn!(session = %self.id, path = %path.display(), error = %e, "breakpoint replay failed");
                }
            }
        }
        if capabilities.configuration_done() {
            self.request("configurationDone", None).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------

    async fn require(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), DapError> {
        self.shared.core.lock().await.require(operation, allowed)
    }

    async fn resume(
        &self,
        operation: &'static str,
        command: &str,
        thread_id: i64,
    ) -> Result<(), DapError> {
        {
            let mut core = self.shared.core.lock().await;
            core.require(operation, &[SessionState::Paused])?;
            // Running before the request goes out, so a fast `stopped`
            // event cannot be overwritten afterwards.
            core.transition(SessionState::Running);
        }
        let result = self
            .request(command, Some(to_arguments(&ThreadArguments { thread_id })?))
            .await;
        if result.is_err() {
            let mut core = self.shared.core.lock().await;
            if core.closure.is_none() && core.state == SessionState::Running {
                core.transition(SessionState::Paused);
            }
        }
        result.map(|_| ())
    }

    async fn send_breakpoints(
        &self,
        path: &Path,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<BreakpointResponse>, DapError> {
        let arguments = SetBreakpointsArguments {
            source: Source {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                path: Some(path.display().to_string()),
            },
            breakpoints,
        };
        let body = self
            .request("setBreakpoints", Some(to_arguments(&arguments)?))
            .await?;
        let body: SetBreakpointsResponseBody = decode_body("setBreakpoints", body)?;
        Ok(body.breakpoints)
    }

    async fn send(&self, command: &str, arguments: Option<Value>) -> Result<InFlight, DapError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut core = self.shared.core.lock().await;
            core.ensure_open()?;
            core.pending.register(seq, command)
        };

        let frame = encode_message(&Message::Request(Request::new(seq, command, arguments)).to_value());
        let delivered = match &self.writer_tx {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        };
        if !delivered {
            self.shared.core.lock().await.pending.forget(seq);
            return Err(DapError::AdapterDisconnected);
        }

        tracing::debug!(session = %self.id, seq, command, "request sent");
        Ok(InFlight {
            seq,
            command: command.to_string(),
            rx,
        })
    }

    async fn await_reply(&self, in_flight: InFlight, deadline: Duration) -> Result<Response, DapError> {
        let InFlight { seq, command, rx } = in_flight;
        match timeout(deadline, rx).await {
            Ok(reply) => self.settle(&command, reply),
            Err(_) => Err(self.expire(seq, command, deadline).await),
        }
    }

    fn settle(
        &self,
        command: &str,
        reply: Result<Reply, oneshot::error::RecvError>,
    ) -> Result<Response, DapError> {
        match reply {
            Ok(Ok(response)) if response.success => Ok(response),
            Ok(Ok(response)) => Err(DapError::Rejected {
                command: command.to_string(),
                message: response.failure_text(),
            }),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(DapError::AdapterDisconnected),
        }
    }

    async fn expire(&self, seq: i64, command: String, deadline: Duration) -> DapError {
        let timeout_ms = millis(deadline);
        let mut core = self.shared.core.lock().await;
        core.pending.forget(seq);
        core.consecutive_timeouts += 1;
        let count = core.consecutive_timeouts;
        tracing::warn!(session = %self.id, seq, command = %command, timeout_ms, count, "request timed out");
        if count >= self.options.max_consecutive_timeouts && core.state.is_live() {
            tracing::warn!(session = %self.id, count, "adapter presumed dead");
            core.transition(SessionState::Terminating);
        }
        DapError::AdapterUnresponsive {
            command,
            timeout_ms,
        }
    }

    async fn shutdown(&mut self, closure: Closure, farewell: bool) {
        let failed = {
            let mut core = self.shared.core.lock().await;
            let failed = core.pending.fail_all(&closure.error());
            if core.closure.is_none() {
                core.closure = Some(closure);
            }
            if core.state.is_live() {
                core.transition(SessionState::Terminating);
            }
            failed
        };

        if let Some(writer_tx) = self.writer_tx.take() {
            if farewell {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let arguments = DisconnectArguments {
                    restart: None,
                    terminate_debuggee: Some(true),
                };
                let request = Request::new(seq, "disconnect", serde_json::to_value(&arguments).ok());
                let _ = writer_tx
                    .send(encode_message(&Message::Request(request).to_value()))
                    .await;
            }
        }
        if let Some(mut writer) = self.writer.take() {
            if timeout(DISCONNECT_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
        }
        self.reader.abort();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(session = %self.id, error = %e, "adapter process already gone");
            }
        }

        self.shared
            .core
            .lock()
            .await
            .transition(SessionState::Terminated);
        tracing::info!(session = %self.id, ?closure, failed, "session closed");
    }
}

impl Drop for DebuggerSession {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl fmt::Debug for DebuggerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerSession")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("kind", &self.launch.kind)
            .finish()
    }
}

async fn write_loop(
    id: SessionId,
    mut writer: Box<dyn AsyncWrite + Send + Unpin>,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            tracing::debug!(session = %id, error = %e, "adapter write failed");
            return;
        }
        if let Err(e) = writer.flush().await {
            tracing::debug!(session = %id, error = %e, "adapter flush failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(reader: Box<dyn AsyncRead + Send + Unpin>, shared: Arc<Shared>) {
    let id = shared.id;
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader).await {
            Ok(Some(value)) => match Message::from_value(value) {
                Ok(message) => shared.route(message).await,
                Err(e) => tracing::warn!(session = %id, error = %e, "dropping unreadable message"),
            },
            Ok(None) => {
                tracing::debug!(session = %id, "adapter closed the stream");
                break;
            }
            Err(DapError::InvalidResponse(e)) => {
                tracing::warn!(session = %id, error = %e, "skipping malformed frame");
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "adapter transport failed");
                break;
            }
        }
    }
    shared.adapter_gone().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::AdapterCommand;
    use crate::testing::{FakeAdapter, FakeConnector, FakeScript};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn launch_request() -> LaunchRequest {
        LaunchRequest {
            kind: RequestKind::Launch,
            adapter: AdapterCommand::new("fake", "fake-adapter", [""; 0]),
            arguments: json!({"program": "/tmp/app.py"}),
        }
    }

    fn fast_options() -> SessionOptions {
        SessionOptions {
            request_timeout: Duration::from_millis(200),
            launch_timeout: Duration::from_millis(500),
            max_consecutive_timeouts: 2,
        }
    }

    async fn start_with(script: FakeScript) -> (DebuggerSession, crate::testing::FakeAdapterHandle) {
        let (streams, handle) = FakeAdapter::spawn(script);
        let mut breakpoints = BreakpointManager::new();
        let session = DebuggerSession::start(
            Arc::new(Connection::local()),
            launch_request(),
            streams,
            &mut breakpoints,
            fast_options(),
        )
        .await
        .unwrap();
        (session, handle)
    }

    async fn wait_for_state(session: &DebuggerSession, want: SessionState) {
        for _ in 0..200 {
            if session.state().await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached {want}, still {}", session.state().await);
    }

    #[test]
    fn state_transitions() {
        use SessionState::*;
        assert!(Disconnected.can_transition_to(Launching));
        assert!(Launching.can_transition_to(Running));
        assert!(Launching.can_transition_to(Paused));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));
        assert!(!Running.can_transition_to(Launching));
        assert!(!Terminated.can_transition_to(Launching));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Terminating.can_transition_to(Running));
    }

    #[test]
    fn session_ids_are_unique_and_display_with_prefix() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b.value() > a.value());
        assert_eq!(a.to_string(), format!("S{}", a.value()));
    }

    #[tokio::test]
    async fn handshake_runs_in_protocol_order() {
        let (session, handle) = start_with(FakeScript::default()).await;
        assert_eq!(session.state().await, SessionState::Running);
        assert_eq!(
            handle.commands(),
            vec!["initialize", "launch", "configurationDone"]
        );
        assert!(session.capabilities().await.configuration_done());
    }

    #[tokio::test]
    async fn handshake_replays_breakpoints() {
        let (streams, handle) = FakeAdapter::spawn(FakeScript::default());
        let mut breakpoints = BreakpointManager::new();
        breakpoints.add(crate::breakpoint::Breakpoint::new("/src/app.py", 12));
        let _session = DebuggerSession::start(
            Arc::new(Connection::local()),
            launch_request(),
            streams,
            &mut breakpoints,
            fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(
            handle.commands(),
            vec!["initialize", "launch", "setBreakpoints", "configurationDone"]
        );
        assert!(breakpoints.all().all(|bp| bp.verified));
    }

    #[tokio::test]
    async fn handshake_accepts_initialized_after_launch_response() {
        let (session, handle) = start_with(FakeScript::default().initialized_after_launch()).await;
        assert_eq!(session.state().await, SessionState::Running);
        assert_eq!(
            handle.commands(),
            vec!["initialize", "launch", "configurationDone"]
        );
    }

    #[tokio::test]
    async fn rejected_launch_is_launch_failed() {
        let (streams, _handle) =
            FakeAdapter::spawn(FakeScript::default().reject("launch", "program not found"));
        let err = DebuggerSession::start(
            Arc::new(Connection::local()),
            launch_request(),
            streams,
            &mut BreakpointManager::new(),
            fast_options(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, DapError::LaunchFailed(ref m) if m == "program not found"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn rejected_attach_is_attach_failed() {
        let (streams, _handle) =
            FakeAdapter::spawn(FakeScript::default().reject("attach", "no such pid"));
        let mut request = launch_request();
        request.kind = RequestKind::Attach;
        let err = DebuggerSession::start(
            Arc::new(Connection::local()),
            request,
            streams,
            &mut BreakpointManager::new(),
            fast_options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DapError::AttachFailed(ref m) if m == "no such pid"));
    }

    #[tokio::test]
    async fn stop_on_entry_pauses_then_steps() {
        let (session, handle) = start_with(FakeScript::default().stop_on_entry()).await;
        wait_for_state(&session, SessionState::Paused).await;
        assert_eq!(session.stopped_thread().await, Some(1));

        session.next(1).await.unwrap();
        wait_for_state(&session, SessionState::Paused).await;
        assert!(handle.commands().contains(&"next".to_string()));

        session.continue_execution(1).await.unwrap();
        wait_for_state(&session, SessionState::Running).await;
    }

    #[tokio::test]
    async fn control_requests_check_state() {
        let (session, _handle) = start_with(FakeScript::default()).await;
        let err = session.next(1).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot step over while session is running");
        assert_eq!(session.state().await, SessionState::Running);
    }

    #[tokio::test]
    async fn rejection_is_distinguished_from_timeout() {
        let (session, _handle) = start_with(
            FakeScript::default()
                .stop_on_entry()
                .reject("stepIn", "cannot step here"),
        )
        .await;
        wait_for_state(&session, SessionState::Paused).await;

        let err = session.step_in(1).await.unwrap_err();
        assert!(matches!(err, DapError::Rejected { ref message, .. } if message == "cannot step here"));
        assert!(!err.is_timeout());
        // Rejected step leaves the debuggee paused.
        assert_eq!(session.state().await, SessionState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeouts_escalate_to_terminating() {
        let (session, _handle) = start_with(FakeScript::default().silent("threads")).await;

        let first = session.threads().await.unwrap_err();
        assert!(first.is_timeout(), "got {first:?}");
        assert_eq!(session.state().await, SessionState::Running);
        assert_eq!(session.pending_requests().await, 0);

        let second = session.threads().await.unwrap_err();
        assert!(second.is_timeout());
        assert_eq!(session.state().await, SessionState::Terminating);
    }

    #[tokio::test(start_paused = true)]
    async fn response_resets_timeout_count() {
        let (session, _handle) = start_with(FakeScript::default().silent("pause")).await;

        assert!(session.pause(1).await.unwrap_err().is_timeout());
        session.threads().await.unwrap();
        assert!(session.pause(1).await.unwrap_err().is_timeout());
        assert_eq!(session.state().await, SessionState::Running);
    }

    #[tokio::test]
    async fn stray_response_is_ignored() {
        let (session, handle) = start_with(FakeScript::default()).await;
        handle.inject(json!({
            "seq": 900, "type": "response", "request_seq": 4242,
            "success": true, "command": "threads"
        }));
        let threads = session.threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(session.state().await, SessionState::Running);
    }

    #[tokio::test]
    async fn adapter_crash_fails_pending_and_terminates() {
        let (session, _handle) = start_with(FakeScript::default().crash_on("threads")).await;

        let err = session.threads().await.unwrap_err();
        assert!(matches!(err, DapError::AdapterDisconnected), "got {err:?}");
        wait_for_state(&session, SessionState::Terminated).await;

        let err = session.request("threads", None).await.unwrap_err();
        assert!(matches!(err, DapError::SessionTerminated), "got {err:?}");
    }

    #[tokio::test]
    async fn oversized_frame_disconnects_session() {
        let (session, handle) = start_with(FakeScript::default().silent("threads")).await;

        let inject = async {
            while !handle.commands().contains(&"threads".to_string()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            handle.inject_raw(b"Content-Length: 18446744073709551615\r\n\r\n".to_vec());
        };
        let (result, ()) = tokio::join!(session.threads(), inject);

        let err = result.unwrap_err();
        assert!(matches!(err, DapError::AdapterDisconnected), "got {err:?}");
        wait_for_state(&session, SessionState::Terminated).await;
        let err = session.request("threads", None).await.unwrap_err();
        assert!(matches!(err, DapError::SessionTerminated), "got {err:?}");
    }

    #[tokio::test]
    async fn events_reach_observers_in_order() {
        let (session, handle) = start_with(FakeScript::default()).await;
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session
            .on_event(move |event| sink.lock().unwrap().push(event.event.clone()))
            .await;

        handle.inject(json!({"seq": 1, "type": "event", "event": "output",
            "body": {"category": "stdout", "output": "hi\n"}}));
        handle.inject(json!({"seq": 2, "type": "event", "event": "exited",
            "body": {"exitCode": 3}}));
        handle.inject(json!({"seq": 3, "type": "event", "event": "terminated"}));

        wait_for_state(&session, SessionState::Terminating).await;
        assert_eq!(session.exit_code().await, Some(3));
        assert_eq!(*seen.lock().unwrap(), vec!["output", "exited", "terminated"]);
    }

    #[tokio::test]
    async fn terminate_closes_session() {
        let (mut session, handle) = start_with(FakeScript::default()).await;
        session.terminate().await.unwrap();
        assert_eq!(session.state().await, SessionState::Terminated);
        assert!(handle.commands().contains(&"disconnect".to_string()));

        // A second terminate is a no-op.
        session.terminate().await.unwrap();
        let err = session.threads().await.unwrap_err();
        assert!(matches!(err, DapError::SessionTerminated));
    }

    #[tokio::test]
    async fn terminate_prefers_terminate_request_when_supported() {
        let (mut session, handle) = start_with(FakeScript::default().supports_terminate()).await;
        session.terminate().await.unwrap();
        let commands = handle.commands();
        assert!(commands.contains(&"terminate".to_string()), "{commands:?}");
    }

    #[tokio::test]
    async fn relaunch_yields_new_identifier() {
        let connector = FakeConnector::new();
        let mut breakpoints = BreakpointManager::new();
        let first = DebuggerSession::connect(
            &connector,
            Arc::new(Connection::local()),
            launch_request(),
            &mut breakpoints,
            fast_options(),
        )
        .await
        .unwrap();
        let before = first.id();

        let second = first.relaunch(&connector, &mut breakpoints).await.unwrap();
        assert_ne!(second.id(), before);
        assert_eq!(second.state().await, SessionState::Running);
        assert_eq!(connector.connections(), 2);

        let old = connector.adapter(0).unwrap();
        assert!(old.commands().contains(&"disconnect".to_string()));
    }

    #[tokio::test]
    async fn relaunch_fails_outstanding_requests_as_replaced() {
        let connector = FakeConnector::with_script(FakeScript::default().silent("evaluate"));
        let mut breakpoints = BreakpointManager::new();
        let first = DebuggerSession::connect(
            &connector,
            Arc::new(Connection::local()),
            launch_request(),
            &mut breakpoints,
            fast_options(),
        )
        .await
        .unwrap();
        let in_flight = first.send("evaluate", None).await.unwrap();
        assert_eq!(first.pending_requests().await, 1);

        let second = first.relaunch(&connector, &mut breakpoints).await.unwrap();
        let reply = in_flight.rx.await.unwrap();
        assert!(matches!(reply, Err(DapError::SessionReplaced)), "got {reply:?}");

        assert!(connector.adapter(0).unwrap().commands().contains(&"disconnect".to_string()));
        assert_eq!(second.pending_requests().await, 0);
        assert_eq!(second.threads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn relaunch_failure_reports_launch_failed() {
        let connector = FakeConnector::new();
        let mut breakpoints = BreakpointManager::new();
        let first = DebuggerSession::connect(
            &connector,
            Arc::new(Connection::local()),
            launch_request(),
            &mut breakpoints,
            fast_options(),
        )
        .await
        .unwrap();

        connector.push_script(FakeScript::default().reject("launch", "busy"));
        let err = first.relaunch(&connector, &mut breakpoints).await.unwrap_err();
        assert!(matches!(err, DapError::LaunchFailed(ref m) if m == "busy"));
    }
}
