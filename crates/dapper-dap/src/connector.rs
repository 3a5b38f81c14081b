//! Opening the byte stream to a debug adapter.
//!
//! The session treats the adapter transport as an opaque duplex stream.
//! Connectors decide how that stream is obtained: a spawned child process
//! for local targets, a TCP socket for remote adapters, or an in-memory
//! pipe in tests.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command as TokioCommand};

use crate::connection::{Connection, TransportKind};
use crate::error::DapError;
use crate::launch::AdapterCommand;

/// The two halves of an adapter conversation, plus the owning process.
pub struct AdapterStreams {
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub(crate) child: Option<Child>,
}

impl AdapterStreams {
    /// Wrap a read half and a write half.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }

    /// Attach the adapter process so it is killed with the session.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }
}

impl std::fmt::Debug for AdapterStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterStreams")
            .field("child", &self.child.as_ref().and_then(|c| c.id()))
            .finish()
    }
}

/// Obtains adapter streams for a connection.
#[async_trait]
pub trait AdapterConnector: Send + Sync {
    /// Open a fresh conversation with the adapter described by `adapter`.
    async fn connect(
        &self,
        connection: &Connection,
        adapter: &AdapterCommand,
    ) -> Result<AdapterStreams, DapError>;
}

/// Spawns local adapters as child processes and dials remote ones over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessConnector;

#[async_trait]
impl AdapterConnector for ProcessConnector {
    async fn connect(
        &self,
        connection: &Connection,
        adapter: &AdapterCommand,
    ) -> Result<AdapterStreams, DapError> {
        match (connection.transport(), connection.port()) {
            (TransportKind::LocalProcess, _) => spawn_adapter(adapter),
            (TransportKind::Remote, Some(port)) => {
                let stream = TcpStream::connect((connection.host(), port))
                    .await
                    .map_err(|e| DapError::Transport(format!("connect {connection}: {e}")))?;
                tracing::debug!(%connection, "connected to remote adapter");
                let (reader, writer) = stream.into_split();
                Ok(AdapterStreams::new(reader, writer))
            }
            (TransportKind::Remote, None) => Err(DapError::InvalidConnection(format!(
                "{connection} (remote adapter needs a port)"
            ))),
        }
    }
}

fn spawn_adapter(adapter: &AdapterCommand) -> Result<AdapterStreams, DapError> {
    let mut child = TokioCommand::new(&adapter.command)
        .args(&adapter.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| DapError::Transport("could not capture adapter stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DapError::Transport("could not capture adapter stdout".into()))?;

    tracing::debug!(command = %adapter.command, pid = ?child.id(), "spawned adapter");
    Ok(AdapterStreams::new(stdout, stdin).with_child(child))
}
