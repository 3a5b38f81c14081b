//! Identity of a debug target endpoint.

use std::fmt;

use crate::error::DapError;

/// How the adapter for a connection is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Adapter runs as a child process on this machine.
    LocalProcess,
    /// Adapter lives on another host.
    Remote,
}

/// An addressable debug target endpoint. Immutable once built; share it
/// behind an `Arc` between provider lookups and the active session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    host: String,
    port: Option<u16>,
    transport: TransportKind,
}

impl Connection {
    /// The local machine, adapter spawned as a child process.
    pub fn local() -> Self {
        Self {
            host: "localhost".into(),
            port: None,
            transport: TransportKind::LocalProcess,
        }
    }

    /// A remote host, optionally with the port its adapter listens on.
    pub fn remote(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            transport: TransportKind::Remote,
        }
    }

    /// Parse a descriptor: `local`, `host`, `host:port`, optionally
    /// prefixed with a `scheme://`.
    pub fn parse(descriptor: &str) -> Result<Self, DapError> {
        let trimmed = descriptor.trim();
        let rest = match trimmed.split_once("://") {
            Some((_, rest)) => rest,
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(DapError::InvalidConnection(descriptor.to_string()));
        }
        if rest.eq_ignore_ascii_case("local") {
            return Ok(Self::local());
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DapError::InvalidConnection(descriptor.to_string()))?;
                (host, Some(port))
            }
            None => (rest, None),
        };
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(DapError::InvalidConnection(descriptor.to_string()));
        }
        Ok(Self::remote(host, port))
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Adapter port, when the adapter is reached over the network.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// How the adapter is reached.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Whether the target is on another host.
    pub fn is_remote(&self) -> bool {
        self.transport == TransportKind::Remote
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.transport, self.port) {
            (TransportKind::LocalProcess, _) => write!(f, "local"),
            (TransportKind::Remote, Some(port)) => write!(f, "{}:{}", self.host, port),
            (TransportKind::Remote, None) => write!(f, "{}", self.host),
        }
    }
}
