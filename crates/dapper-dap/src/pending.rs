//! Outstanding request table keyed by `seq`.
//!
//! Each request registers a oneshot sender; the reader task resolves it
//! when the matching response arrives. Every entry resolves at most once:
//! it is removed on response, on cancellation, or on expiry.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::DapError;
use crate::protocol::Response;

/// Outcome delivered to a waiting caller.
pub type Reply = Result<Response, DapError>;

#[derive(Debug)]
struct PendingRequest {
    command: String,
    tx: oneshot::Sender<Reply>,
}

/// Requests awaiting a response from the adapter.
#[derive(Debug, Default)]
pub struct PendingRequests {
    pending: HashMap<i64, PendingRequest>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `seq` and return the receiver its outcome will arrive on.
    pub fn register(&mut self, seq: i64, command: &str) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.insert(
            seq,
            PendingRequest {
                command: command.to_string(),
                tx,
            },
        );
        if previous.is_some() {
            tracing::warn!(seq, "sequence number reused while still pending");
        }
        rx
    }

    /// How many requests are outstanding.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Route a response to its caller.
    ///
    /// Returns `false` when no request with `request_seq` is outstanding;
    /// such a response is a protocol violation and is dropped.
    pub fn resolve(&mut self, response: Response) -> bool {
        match self.pending.remove(&response.request_seq) {
            Some(entry) => {
                // The caller may have stopped waiting; that is fine.
                let _ = entry.tx.send(Ok(response));
                true
            }
            None => {
                tracing::warn!(
                    request_seq = response.request_seq,
                    command = %response.command,
                    "response for unknown request"
                );
                false
            }
        }
    }

    /// Drop an entry without notifying its receiver.
    pub fn forget(&mut self, seq: i64) -> bool {
        match self.pending.remove(&seq) {
            Some(entry) => {
                tracing::debug!(seq, command = %entry.command, "request abandoned");
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding request with a copy of `error`.
    /// Returns how many callers were notified.
    pub fn fail_all(&mut self, error: &DapError) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            let _ = entry.tx.send(Err(error.duplicate()));
        }
        count
    }
}
