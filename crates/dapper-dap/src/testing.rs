//! In-memory debug adapter for tests.
//!
//! [`FakeAdapter`] speaks the adapter protocol over a `tokio::io::duplex`
//! pipe and answers requests according to a [`FakeScript`].
//! [`FakeConnector`] hands out one fake adapter per connection so session
//! restarts can be observed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::connector::{AdapterConnector, AdapterStreams};
use crate::error::DapError;
use crate::launch::AdapterCommand;
use crate::protocol::{Request, Response};
use crate::transport::{encode_message, read_message, write_message};

const PIPE_CAPACITY: usize = 64 * 1024;

/// How a fake adapter behaves.
#[derive(Debug, Clone)]
pub struct FakeScript {
    /// Commands that never receive a response.
    pub silent: HashSet<String>,
    /// Commands answered with `success: false` and the given message.
    pub reject: HashMap<String, String>,
    /// Command whose arrival makes the adapter drop its streams.
    pub crash_on: Option<String>,
    /// Emit `stopped` (reason "entry") once launched.
    pub stop_on_entry: bool,
    /// Advertise `supportsConfigurationDoneRequest`.
    pub supports_configuration_done: bool,
    /// Advertise `supportsTerminateRequest`.
    pub supports_terminate: bool,
    /// Send `initialized` after the launch response instead of after
    /// `initialize`.
    pub initialized_after_launch: bool,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            silent: HashSet::new(),
            reject: HashMap::new(),
            crash_on: None,
            stop_on_entry: false,
            supports_configuration_done: true,
            supports_terminate: false,
            initialized_after_launch: false,
        }
    }
}

impl FakeScript {
    /// Never answer `command`.
    pub fn silent(mut self, command: &str) -> Self {
        self.silent.insert(command.to_string());
        self
    }

    /// Answer `command` with a failure.
    pub fn reject(mut self, command: &str, message: &str) -> Self {
        self.reject.insert(command.to_string(), message.to_string());
        self
    }

    /// Drop the connection when `command` arrives.
    pub fn crash_on(mut self, command: &str) -> Self {
        self.crash_on = Some(command.to_string());
        self
    }

    /// Stop on entry after launch.
    pub fn stop_on_entry(mut self) -> Self {
        self.stop_on_entry = true;
        self
    }

    /// Advertise the `terminate` request.
    pub fn supports_terminate(mut self) -> Self {
        self.supports_terminate = true;
        self
    }

    /// Delay `initialized` until the launch response has gone out.
    pub fn initialized_after_launch(mut self) -> Self {
        self.initialized_after_launch = true;
        self
    }
}

/// Test-side view of a running fake adapter.
#[derive(Debug)]
pub struct FakeAdapterHandle {
    requests: Arc<Mutex<Vec<Request>>>,
    inject: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl FakeAdapterHandle {
    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// Write a raw message (event or stray response) to the client.
    pub fn inject(&self, message: Value) {
        let _ = self.inject.send(encode_message(&message));
    }

    /// Write raw bytes to the client, bypassing framing.
    pub fn inject_raw(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.inject.send(bytes.into());
    }

    /// Kill the adapter abruptly.
    pub fn crash(&self) {
        self.task.abort();
    }

    /// Whether the adapter has stopped serving.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Scripted in-memory adapter.
pub struct FakeAdapter {
    script: FakeScript,
    seq: i64,
    deferred_launch: Option<Request>,
    requests: Arc<Mutex<Vec<Request>>>,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl FakeAdapter {
    /// Start a fake adapter; returns the client-side streams and a handle.
    pub fn spawn(script: FakeScript) -> (AdapterStreams, FakeAdapterHandle) {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let adapter = FakeAdapter {
            script,
            seq: 0,
            deferred_launch: None,
            requests: Arc::clone(&requests),
        };
        let task = tokio::spawn(adapter.serve(server_read, server_write, inject_rx));

        (
            AdapterStreams::new(client_read, client_write),
            FakeAdapterHandle {
                requests,
                inject: inject_tx,
                task,
            },
        )
    }

    async fn serve(
        mut self,
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        mut inject: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let pump_writer = Arc::clone(&writer);
        let _pump = AbortOnDrop(tokio::spawn(async move {
            while let Some(bytes) = inject.recv().await {
                let mut out = pump_writer.lock().await;
                if out.write_all(&bytes).await.is_err() || out.flush().await.is_err() {
                    return;
                }
            }
        }));

        let mut reader = BufReader::new(reader);
        while let Ok(Some(value)) = read_message(&mut reader).await {
            let Ok(request) = serde_json::from_value::<Request>(value) else {
                continue;
            };
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            if self.script.crash_on.as_deref() == Some(request.command.as_str()) {
                return;
            }
            if self.script.silent.contains(&request.command) {
                continue;
            }

            let replies = self.answer(&request);
            let mut out = writer.lock().await;
            for reply in &replies {
                if write_message(&mut *out, reply).await.is_err() {
                    return;
                }
            }
            if request.command == "disconnect" {
                return;
            }
        }
    }

    fn answer(&mut self, request: &Request) -> Vec<Value> {
        if let Some(message) = self.script.reject.get(&request.command).cloned() {
            let seq = self.next_seq();
            return vec![to_json(&Response::failure(seq, request, message))];
        }

        let mut out = Vec::new();
        match request.command.as_str() {
            "initialize" => {
                let capabilities = json!({
                    "supportsConfigurationDoneRequest": self.script.supports_configuration_done,
                    "supportsTerminateRequest": self.script.supports_terminate,
                });
                out.push(self.ok(request, Some(capabilities)));
                if !self.script.initialized_after_launch {
                    out.push(self.event("initialized", None));
                }
            }
            "launch" | "attach" => {
                if self.script.supports_configuration_done && !self.script.initialized_after_launch {
                    self.deferred_launch = Some(request.clone());
                } else {
                    out.push(self.ok(request, None));
                    if self.script.initialized_after_launch {
                        out.push(self.event("initialized", None));
                    }
                    out.extend(self.after_launch());
                }
            }
            "configurationDone" => {
                out.push(self.ok(request, None));
                if let Some(launch) = self.deferred_launch.take() {
                    out.push(self.ok(&launch, None));
                    out.extend(self.after_launch());
                }
            }
            "setBreakpoints" => {
                let requested = request
                    .arguments
                    .as_ref()
                    .and_then(|a| a.get("breakpoints"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let acks: Vec<Value> = requested
                    .iter()
                    .enumerate()
                    .map(|(i, bp)| json!({"id": i + 1, "verified": true, "line": bp["line"]}))
                    .collect();
                out.push(self.ok(request, Some(json!({"breakpoints": acks}))));
            }
            "threads" => {
                out.push(self.ok(request, Some(json!({"threads": [{"id": 1, "name": "main"}]}))));
            }
            "continue" => {
                out.push(self.ok(request, Some(json!({"allThreadsContinued": true}))));
                out.push(self.event("continued", Some(json!({"threadId": thread_of(request)}))));
            }
            "next" | "stepIn" | "stepOut" => {
                out.push(self.ok(request, None));
                out.push(self.stopped("step", thread_of(request)));
            }
            "pause" => {
                out.push(self.ok(request, None));
                out.push(self.stopped("pause", thread_of(request)));
            }
            "terminate" => {
                out.push(self.ok(request, None));
                out.push(self.event("terminated", None));
            }
            _ => out.push(self.ok(request, None)),
        }
        out
    }

    fn after_launch(&mut self) -> Vec<Value> {
        if self.script.stop_on_entry {
            vec![self.stopped("entry", 1)]
        } else {
            Vec::new()
        }
    }

    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn ok(&mut self, request: &Request, body: Option<Value>) -> Value {
        let seq = self.next_seq();
        to_json(&Response::success(seq, request, body))
    }

    fn event(&mut self, name: &str, body: Option<Value>) -> Value {
        let seq = self.next_seq();
        let mut event = json!({"seq": seq, "type": "event", "event": name});
        if let Some(body) = body {
            event["body"] = body;
        }
        event
    }

    fn stopped(&mut self, reason: &str, thread_id: i64) -> Value {
        self.event("stopped", Some(json!({"reason": reason, "threadId": thread_id})))
    }
}

fn thread_of(request: &Request) -> i64 {
    request
        .arguments
        .as_ref()
        .and_then(|a| a.get("threadId"))
        .and_then(Value::as_i64)
        .unwrap_or(1)
}

fn to_json(response: &Response) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

/// Connector that serves every connection with a fresh [`FakeAdapter`].
pub struct FakeConnector {
    default_script: FakeScript,
    queued: Mutex<VecDeque<FakeScript>>,
    adapters: Mutex<Vec<Arc<FakeAdapterHandle>>>,
    refuse: bool,
}

impl FakeConnector {
    /// Connector whose adapters follow the default script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose adapters follow `script` unless one is queued.
    pub fn with_script(script: FakeScript) -> Self {
        Self {
            default_script: script,
            ..Self::default()
        }
    }

    /// Connector that fails every connection attempt.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Use `script` for the next connection only.
    pub fn push_script(&self, script: FakeScript) {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    /// How many adapters have been started.
    pub fn connections(&self) -> usize {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Handle for the `index`-th adapter started.
    pub fn adapter(&self, index: usize) -> Option<Arc<FakeAdapterHandle>> {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Handle for the most recent adapter.
    pub fn last_adapter(&self) -> Option<Arc<FakeAdapterHandle>> {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            default_script: FakeScript::default(),
            queued: Mutex::new(VecDeque::new()),
            adapters: Mutex::new(Vec::new()),
            refuse: false,
        }
    }
}

#[async_trait]
impl AdapterConnector for FakeConnector {
    async fn connect(
        &self,
        connection: &Connection,
        _adapter: &AdapterCommand,
    ) -> Result<AdapterStreams, DapError> {
        if self.refuse {
            return Err(DapError::Transport(format!("connect {connection}: refused")));
        }
        let script = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        let (streams, handle) = FakeAdapter::spawn(script);
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handle));
        Ok(streams)
    }
}
