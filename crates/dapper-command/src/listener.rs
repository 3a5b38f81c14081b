//! Remote debug triggers.
//!
//! A trigger names a runtime, a connection descriptor and a target:
//!
//! ```json
//! {"runtime": "python", "connection": "devbox:5678", "target": {"port": 5678}}
//! ```
//!
//! Triggers arrive as newline-delimited JSON over TCP, or in-process over
//! an mpsc channel. Each well-formed trigger is routed through the
//! dispatcher queue. Malformed ones are logged and dropped. A TCP line
//! longer than [`MAX_TRIGGER_LINE`] is answered with an error and the
//! connection closed. Every source is
//! owned by a [`ListenerHandle`] that stops it on [`ListenerHandle::shutdown`]
//! or drop.

use std::net::SocketAddr;
use std::sync::Arc;

use dapper_dap::Connection;
use dapper_provider::DebugTarget;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::dispatcher::{DispatcherHandle, StartRequest};
use crate::error::CommandError;

/// Longest accepted TCP trigger line in bytes, newline included.
pub const MAX_TRIGGER_LINE: usize = 64 * 1024;

/// A trigger as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub runtime: String,
    /// `local`, `host` or `host:port`.
    #[serde(default = "local_descriptor")]
    pub connection: String,
    #[serde(default)]
    pub target: DebugTarget,
}

fn local_descriptor() -> String {
    "local".to_string()
}

impl Trigger {
    /// Parse one wire line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let trigger: Trigger = serde_json::from_str(line.trim())
            .map_err(|e| CommandError::MalformedTrigger(e.to_string()))?;
        if trigger.runtime.trim().is_empty() {
            return Err(CommandError::MalformedTrigger("empty runtime".into()));
        }
        Ok(trigger)
    }

    /// Resolve the connection descriptor.
    pub fn into_request(self) -> Result<StartRequest, CommandError> {
        let connection = Connection::parse(&self.connection)
            .map_err(|e| CommandError::MalformedTrigger(e.to_string()))?;
        Ok(StartRequest {
            runtime: self.runtime,
            connection: Arc::new(connection),
            target: self.target,
        })
    }
}

/// Reply line written back to a TCP trigger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerReply {
    fn from_result(result: &Result<String, CommandError>) -> Self {
        match result {
            Ok(session) => Self {
                ok: true,
                session: Some(session.clone()),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                session: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Parse `line` and start its session. Errors are logged here.
async fn handle_trigger(line: &str, dispatcher: &DispatcherHandle) -> Result<String, CommandError> {
    let request = match Trigger::parse(line).and_then(Trigger::into_request) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed trigger");
            return Err(e);
        }
    };
    let runtime = request.runtime.clone();
    let connection = Arc::clone(&request.connection);
    match dispatcher.start_session(request).await {
        Ok(id) => {
            tracing::info!(session = %id, runtime = %runtime, %connection, "trigger started session");
            Ok(id.to_string())
        }
        Err(e) => {
            tracing::warn!(runtime = %runtime, %connection, error = %e, "trigger failed");
            Err(e)
        }
    }
}

/// Owns a running trigger source.
pub struct ListenerHandle {
    local_addr: Option<SocketAddr>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Bound address, for TCP sources.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting, close open trigger connections and wait for the
    /// source task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!("trigger listener stopped");
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Subscribes trigger sources to a dispatcher.
pub struct RemoteCommandListener;

impl RemoteCommandListener {
    /// Accept NDJSON trigger connections on `address`.
    pub async fn bind(
        address: &str,
        dispatcher: DispatcherHandle,
    ) -> Result<ListenerHandle, CommandError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(CommandError::Listener)?;
        let local_addr = listener.local_addr().map_err(CommandError::Listener)?;
        tracing::info!(%local_addr, "trigger listener bound");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, dispatcher, shutdown_rx));
        Ok(ListenerHandle {
            local_addr: Some(local_addr),
            shutdown,
            task: Some(task),
        })
    }

    /// Take triggers from an in-process channel.
    pub fn from_channel(
        mut triggers: mpsc::Receiver<String>,
        dispatcher: DispatcherHandle,
    ) -> ListenerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    line = triggers.recv() => {
                        let Some(line) = line else { break };
                        let _ = handle_trigger(&line, &dispatcher).await;
                    }
                }
            }
        });
        ListenerHandle {
            local_addr: None,
            shutdown,
            task: Some(task),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: DispatcherHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accept = listener.accept() => match accept {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "trigger connection accepted");
                    let dispatcher = dispatcher.clone();
                    clients.spawn(async move {
                        if let Err(e) = serve_client(stream, &dispatcher).await {
                            tracing::warn!(%peer, error = %e, "trigger connection error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "trigger accept failed"),
            },
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }
    clients.shutdown().await;
}

async fn serve_client(stream: TcpStream, dispatcher: &DispatcherHandle) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let line = match read_trigger_line(&mut reader).await? {
            TriggerLine::Eof => return Ok(()),
            TriggerLine::TooLong => {
                let err = CommandError::MalformedTrigger(format!(
                    "line exceeds {MAX_TRIGGER_LINE} bytes"
                ));
                tracing::warn!(error = %err, "closing trigger connection");
                write_reply(&mut write_half, &TriggerReply::from_result(&Err(err))).await?;
                return Ok(());
            }
            TriggerLine::Line(bytes) => bytes,
        };
        let result = match String::from_utf8(line) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_trigger(&line, dispatcher).await,
            Err(_) => {
                let err = CommandError::MalformedTrigger("line is not UTF-8".into());
                tracing::warn!(error = %err, "dropping malformed trigger");
                Err(err)
            }
        };
        write_reply(&mut write_half, &TriggerReply::from_result(&result)).await?;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TriggerLine {
    Line(Vec<u8>),
    TooLong,
    Eof,
}

/// Read up to and including the next newline, never buffering more than
/// [`MAX_TRIGGER_LINE`] bytes.
async fn read_trigger_line<R>(reader: &mut R) -> std::io::Result<TriggerLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(MAX_TRIGGER_LINE as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(TriggerLine::Eof);
    }
    if n == MAX_TRIGGER_LINE && line.last() != Some(&b'\n') {
        return Ok(TriggerLine::TooLong);
    }
    Ok(TriggerLine::Line(line))
}

async fn write_reply<W>(writer: &mut W, reply: &TriggerReply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(reply)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
