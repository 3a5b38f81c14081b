//! Adapter protocol message types.
//!
//! Envelopes exchanged with a debug adapter plus the argument and body
//! shapes the session layer reads or writes. Field names follow the
//! adapter wire format (`camelCase` except for `request_seq`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DapError;

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A request sent to the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number; the correlation key for the response.
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The command to execute.
    pub command: String,
    /// Command arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    /// Build a request envelope.
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request".into(),
            command: command.into(),
            arguments,
        }
    }
}

/// A response from the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this message.
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: String,
    /// Sequence number of the request this answers.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// The command this response is for.
    #[serde(default)]
    pub command: String,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Successful response to `request`.
    pub fn success(seq: i64, request: &Request, body: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "response".into(),
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// Failed response to `request`.
    pub fn failure(seq: i64, request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq,
            message_type: "response".into(),
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }

    /// Best human-readable failure text: `message`, then `body.error.format`.
    pub fn failure_text(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        self.body
            .as_ref()
            .and_then(|b| b.pointer("/error/format"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "no message".to_string())
    }
}

/// An event pushed by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The event name.
    pub event: String,
    /// Event-specific body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Build an event envelope.
    pub fn new(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "event".into(),
            event: event.into(),
            body,
        }
    }
}

/// Any envelope, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Request (adapter-to-client requests are logged and ignored).
    Request(Request),
    /// Response correlated by `request_seq`.
    Response(Response),
    /// Uncorrelated event.
    Event(Event),
}

impl Message {
    /// Classify a decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, DapError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DapError::InvalidResponse("missing message type".into()))?;
        let parsed = match kind.as_str() {
            "request" => serde_json::from_value(value).map(Message::Request),
            "response" => serde_json::from_value(value).map(Message::Response),
            "event" => serde_json::from_value(value).map(Message::Event),
            other => {
                return Err(DapError::InvalidResponse(format!(
                    "unknown message type '{other}'"
                )))
            }
        };
        parsed.map_err(|e| DapError::InvalidResponse(format!("{kind}: {e}")))
    }

    /// Serialize back into a JSON value.
    pub fn to_value(&self) -> Value {
        let result = match self {
            Message::Request(r) => serde_json::to_value(r),
            Message::Response(r) => serde_json::to_value(r),
            Message::Event(e) => serde_json::to_value(e),
        };
        result.unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Arguments for the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    /// ID of the client.
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable name of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// ID of the debug adapter.
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    /// Whether lines are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    /// Whether columns are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    /// Path format: "path" or "uri".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
}

impl InitializeRequestArguments {
    /// Arguments this client always sends.
    pub fn for_adapter(adapter_id: impl Into<String>) -> Self {
        Self {
            client_id: Some("dapper".into()),
            client_name: Some("dapper".into()),
            adapter_id: adapter_id.into(),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".into()),
        }
    }
}

/// Capabilities returned in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// The adapter supports the `configurationDone` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    /// The adapter supports conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_conditional_breakpoints: Option<bool>,
    /// The adapter supports the `terminate` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_terminate_request: Option<bool>,
    /// The adapter supports the `restart` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_restart_request: Option<bool>,
}

impl Capabilities {
    /// Whether `configurationDone` must be sent after breakpoints.
    pub fn configuration_done(&self) -> bool {
        self.supports_configuration_done_request.unwrap_or(false)
    }

    /// Whether `terminate` may be sent before `disconnect`.
    pub fn terminate(&self) -> bool {
        self.supports_terminate_request.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

/// A source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Short name of the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File system path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Arguments for the `setBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// The source to set breakpoints for.
    pub source: Source,
    /// Breakpoints to set; replaces all previous ones in the source.
    pub breakpoints: Vec<SourceBreakpoint>,
}

/// A client-side breakpoint as sent to the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// The source line.
    pub line: i64,
    /// Condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Response body for `setBreakpoints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointsResponseBody {
    /// One entry per requested breakpoint, in request order.
    pub breakpoints: Vec<BreakpointResponse>,
}

/// A breakpoint as acknowledged by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointResponse {
    /// Adapter-assigned identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Whether the adapter could bind the breakpoint.
    pub verified: bool,
    /// Actual line, if the adapter moved it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Explanation when unverified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Execution control
// ---------------------------------------------------------------------------

/// Arguments for requests that target one thread
/// (`continue`, `next`, `stepIn`, `stepOut`, `pause`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArguments {
    /// The thread to act on.
    pub thread_id: i64,
}

/// Arguments for the `disconnect` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    /// Whether the adapter should prepare for a restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    /// Whether to terminate the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
}

/// A thread in the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Unique identifier of the thread.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
}

/// Response body for `threads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadsResponseBody {
    /// All threads.
    pub threads: Vec<Thread>,
}

// ---------------------------------------------------------------------------
// Event bodies
// ---------------------------------------------------------------------------

/// Body of the `stopped` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// Why the debuggee stopped ("breakpoint", "step", "pause", ...).
    pub reason: String,
    /// Thread that stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Description of the stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of the `exited` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    /// Exit code of the debuggee.
    pub exit_code: i64,
}

/// Body of the `output` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEventBody {
    /// Output category: "console", "stdout", "stderr", "telemetry".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The output text.
    pub output: String,
}
