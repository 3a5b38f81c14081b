//! dapper-dap — debug adapter protocol client for dapper.
//!
//! This crate owns one conversation with a debug adapter: message framing,
//! request/response correlation by `seq`, the session state machine and
//! client-side breakpoints. Adapters are reached through an
//! [`AdapterConnector`], so the session never cares whether it talks to a
//! child process, a socket or an in-memory fake.
pub mod breakpoint;
pub mod connection;
pub mod connector;
pub mod error;
pub mod launch;
pub mod pending;
pub mod protocol;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

// Re-export key types for convenience.
pub use breakpoint::{Breakpoint, BreakpointManager};
pub use connection::{Connection, TransportKind};
pub use connector::{AdapterConnector, AdapterStreams, ProcessConnector};
pub use error::DapError;
pub use launch::{AdapterCommand, LaunchRequest, RequestKind};
pub use pending::PendingRequests;
pub use protocol::{Capabilities, Event, Message, Request, Response, Thread};
pub use session::{DebuggerSession, EventObserver, SessionId, SessionOptions, SessionState};
