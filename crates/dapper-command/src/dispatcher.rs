//! Serialized command execution.
//!
//! A [`Dispatcher`] owns the command table and the [`DebuggerInterface`].
//! [`Dispatcher::spawn`] moves it onto a worker task that takes jobs from a
//! FIFO queue and runs exactly one at a time, so commands never overlap and
//! complete in submission order. Callers hold a cloneable
//! [`DispatcherHandle`].

use std::sync::Arc;

use dapper_dap::{Connection, SessionId};
use dapper_provider::DebugTarget;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command::{CommandTable, Outcome};
use crate::context::DebuggerInterface;
use crate::error::CommandError;
use crate::parse::parse_line;

/// Queued jobs before submitters wait.
const QUEUE_DEPTH: usize = 64;

/// Result of one command.
pub type CommandResult = Result<Outcome, CommandError>;

/// Request to start a session from outside the REPL.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub runtime: String,
    pub connection: Arc<Connection>,
    pub target: DebugTarget,
}

enum Job {
    Line {
        line: String,
        reply: oneshot::Sender<CommandResult>,
    },
    Start {
        request: StartRequest,
        reply: oneshot::Sender<Result<SessionId, CommandError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Command table plus the interface commands run against.
#[derive(Debug)]
pub struct Dispatcher {
    table: Arc<CommandTable>,
    interface: DebuggerInterface,
}

impl Dispatcher {
    /// `table` is also what `help` reports through `interface`.
    pub fn new(table: CommandTable, mut interface: DebuggerInterface) -> Self {
        let table = Arc::new(table);
        interface.install_commands(Arc::clone(&table));
        Self { table, interface }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn interface(&self) -> &DebuggerInterface {
        &self.interface
    }

    /// Parse and run one input line.
    ///
    /// A blank line is [`Outcome::Silent`]. Failures come back as values;
    /// the dispatcher stays usable after any of them.
    pub async fn dispatch(&mut self, line: &str) -> CommandResult {
        let Some(parsed) = parse_line(line) else {
            return Ok(Outcome::Silent);
        };
        let command = *self.table.lookup(&parsed.name)?;
        tracing::debug!(command = command.name, args = ?parsed.args, "executing");
        let result = command.execute(&mut self.interface, &parsed.args).await;
        if let Err(e) = &result {
            tracing::info!(command = command.name, error = %e, "command failed");
        }
        result
    }

    /// Start a session for an external trigger.
    pub async fn start_session(&mut self, request: StartRequest) -> Result<SessionId, CommandError> {
        let StartRequest {
            runtime,
            connection,
            target,
        } = request;
        self.interface.start(&runtime, connection, &target).await
    }

    /// Move onto a worker task.
    pub fn spawn(self) -> DispatcherHandle {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let worker = tokio::spawn(self.run(rx));
        DispatcherHandle {
            tx,
            worker: Arc::new(std::sync::Mutex::new(Some(worker))),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            match job {
                Job::Line { line, reply } => {
                    let result = self.dispatch(&line).await;
                    let _ = reply.send(result);
                }
                Job::Start { request, reply } => {
                    let result = self.start_session(request).await;
                    let _ = reply.send(result);
                }
                Job::Shutdown { reply } => {
                    self.interface.close_active().await;
                    let _ = reply.send(());
                    tracing::info!("dispatcher stopped");
                    return;
                }
            }
        }
        // Every handle dropped without a shutdown.
        self.interface.close_active().await;
    }
}

/// Cloneable submission side of a spawned [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Job>,
    worker: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl DispatcherHandle {
    /// Queue `line` and return the receiver for its result.
    ///
    /// The job's place in the queue is fixed once this returns.
    pub async fn enqueue(
        &self,
        line: impl Into<String>,
    ) -> Result<oneshot::Receiver<CommandResult>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Line {
                line: line.into(),
                reply,
            })
            .await
            .map_err(|_| CommandError::DispatcherClosed)?;
        Ok(rx)
    }

    /// Queue `line` and wait for its result.
    pub async fn submit(&self, line: impl Into<String>) -> CommandResult {
        let rx = self.enqueue(line).await?;
        rx.await.map_err(|_| CommandError::DispatcherClosed)?
    }

    /// Queue a session start and wait for the new session's id.
    pub async fn start_session(&self, request: StartRequest) -> Result<SessionId, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Start { request, reply })
            .await
            .map_err(|_| CommandError::DispatcherClosed)?;
        rx.await.map_err(|_| CommandError::DispatcherClosed)?
    }

    /// Run every job queued so far, terminate the active session and stop
    /// the worker. Later submissions fail with
    /// [`CommandError::DispatcherClosed`].
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Job::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Whether the worker is still accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
