//! Built-in providers for the runtimes dapper ships with.
//!
//! Python and Node are always offered. React Native is offered behind a
//! gate supplied by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use dapper_dap::{AdapterCommand, Connection, LaunchRequest, RequestKind};
use serde_json::{json, Map, Value};

use crate::error::ProviderError;
use crate::gate::Gate;
use crate::provider::{DebugTarget, LaunchAttachProvider};
use crate::registry::ProviderRegistry;

/// Runtime name of the Python provider.
pub const PYTHON: &str = "python";
/// Runtime name of the Node provider.
pub const NODE: &str = "node";
/// Runtime name of the React Native provider.
pub const REACT_NATIVE: &str = "reactnative";

/// Default Metro packager port.
const PACKAGER_PORT: u16 = 8081;

/// Adapter commands configured per runtime, replacing the built-in ones.
pub type AdapterOverrides = HashMap<String, AdapterCommand>;

fn default_adapter(runtime: &str) -> AdapterCommand {
    match runtime {
        PYTHON => AdapterCommand::new("debugpy", "python3", ["-m", "debugpy.adapter"]),
        NODE => AdapterCommand::new("pwa-node", "js-debug-adapter", [""; 0]),
        _ => AdapterCommand::new("react-native", "react-native-debug-adapter", [""; 0]),
    }
}

fn invalid(runtime: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidTarget {
        runtime: runtime.to_string(),
        message: message.into(),
    }
}

/// `program`, `args` and `cwd` as launch arguments.
fn program_arguments(target: &DebugTarget) -> Map<String, Value> {
    let mut args = Map::new();
    if let Some(program) = &target.program {
        args.insert("program".into(), json!(program));
    }
    args.insert("args".into(), json!(target.args));
    if let Some(cwd) = &target.cwd {
        args.insert("cwd".into(), json!(cwd));
    }
    args
}

fn require_kind(runtime: &str, target: &DebugTarget) -> Result<RequestKind, ProviderError> {
    target
        .request_kind()
        .ok_or_else(|| invalid(runtime, "target names no program, pid or port"))
}

/// Python via debugpy.
pub struct PythonProvider {
    connection: Arc<Connection>,
    adapter: AdapterCommand,
}

impl PythonProvider {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_adapter(connection, default_adapter(PYTHON))
    }

    pub fn with_adapter(connection: Arc<Connection>, adapter: AdapterCommand) -> Self {
        Self {
            connection,
            adapter,
        }
    }
}

impl LaunchAttachProvider for PythonProvider {
    fn runtime(&self) -> &str {
        PYTHON
    }

    fn display_name(&self) -> &str {
        "Python"
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn launch_request(&self, target: &DebugTarget) -> Result<LaunchRequest, ProviderError> {
        let kind = require_kind(PYTHON, target)?;
        let arguments = match kind {
            RequestKind::Launch => {
                let mut args = program_arguments(target);
                args.insert("console".into(), json!("internalConsole"));
                args.insert("justMyCode".into(), json!(true));
                Value::Object(args)
            }
            RequestKind::Attach => match (target.pid, target.port) {
                (Some(pid), _) => json!({ "processId": pid }),
                (None, Some(port)) => json!({
                    "connect": { "host": self.connection.host(), "port": port }
                }),
                (None, None) => return Err(invalid(PYTHON, "attach needs a pid or port")),
            },
        };
        Ok(LaunchRequest {
            kind,
            adapter: self.adapter.clone(),
            arguments,
        })
    }
}

/// Node via the JavaScript debug adapter.
pub struct NodeProvider {
    connection: Arc<Connection>,
    adapter: AdapterCommand,
}

impl NodeProvider {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_adapter(connection, default_adapter(NODE))
    }

    pub fn with_adapter(connection: Arc<Connection>, adapter: AdapterCommand) -> Self {
        Self {
            connection,
            adapter,
        }
    }
}

impl LaunchAttachProvider for NodeProvider {
    fn runtime(&self) -> &str {
        NODE
    }

    fn display_name(&self) -> &str {
        "Node"
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn launch_request(&self, target: &DebugTarget) -> Result<LaunchRequest, ProviderError> {
        let kind = require_kind(NODE, target)?;
        let arguments = match kind {
            RequestKind::Launch => {
                let mut args = program_arguments(target);
                args.insert("type".into(), json!("pwa-node"));
                Value::Object(args)
            }
            RequestKind::Attach => match (target.pid, target.port) {
                (Some(pid), _) => json!({ "type": "pwa-node", "processId": pid }),
                (None, Some(port)) => json!({
                    "type": "pwa-node",
                    "address": self.connection.host(),
                    "port": port,
                }),
                (None, None) => return Err(invalid(NODE, "attach needs a pid or port")),
            },
        };
        Ok(LaunchRequest {
            kind,
            adapter: self.adapter.clone(),
            arguments,
        })
    }
}

/// React Native: attaches to the packager, or launches an app project.
pub struct ReactNativeProvider {
    connection: Arc<Connection>,
    adapter: AdapterCommand,
}

impl ReactNativeProvider {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_adapter(connection, default_adapter(REACT_NATIVE))
    }

    pub fn with_adapter(connection: Arc<Connection>, adapter: AdapterCommand) -> Self {
        Self {
            connection,
            adapter,
        }
    }
}

impl LaunchAttachProvider for ReactNativeProvider {
    fn runtime(&self) -> &str {
        REACT_NATIVE
    }

    fn display_name(&self) -> &str {
        "React Native"
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// An empty target attaches to the packager on its default port.
    fn launch_request(&self, target: &DebugTarget) -> Result<LaunchRequest, ProviderError> {
        if target.pid.is_some() {
            return Err(invalid(
                REACT_NATIVE,
                "cannot attach by pid, use the packager port",
            ));
        }
        let (kind, arguments) = if target.program.is_some() {
            (RequestKind::Launch, Value::Object(program_arguments(target)))
        } else {
            let port = target.port.unwrap_or(PACKAGER_PORT);
            (
                RequestKind::Attach,
                json!({ "address": self.connection.host(), "port": port }),
            )
        };
        Ok(LaunchRequest {
            kind,
            adapter: self.adapter.clone(),
            arguments,
        })
    }
}

/// Register the built-in providers, applying `overrides` to their adapters.
///
/// `reactnative_gate` decides whether React Native is offered.
pub fn register_builtin(
    registry: &mut ProviderRegistry,
    overrides: &AdapterOverrides,
    reactnative_gate: Gate,
) -> Result<(), ProviderError> {
    let adapter = |runtime: &str| {
        overrides
            .get(runtime)
            .cloned()
            .unwrap_or_else(|| default_adapter(runtime))
    };

    let python = adapter(PYTHON);
    registry.register_unconditional(PYTHON, "Python", move |connection| {
        Arc::new(PythonProvider::with_adapter(connection, python.clone()))
            as Arc<dyn LaunchAttachProvider>
    })?;

    let node = adapter(NODE);
    registry.register_unconditional(NODE, "Node", move |connection| {
        Arc::new(NodeProvider::with_adapter(connection, node.clone()))
            as Arc<dyn LaunchAttachProvider>
    })?;

    let react_native = adapter(REACT_NATIVE);
    registry.register(
        REACT_NATIVE,
        "React Native",
        move |connection| {
            Arc::new(ReactNativeProvider::with_adapter(
                connection,
                react_native.clone(),
            )) as Arc<dyn LaunchAttachProvider>
        },
        reactnative_gate,
    )?;

    tracing::info!(runtimes = ?registry.runtimes(), "built-in providers registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Arc<Connection> {
        Arc::new(Connection::local())
    }

    #[test]
    fn python_launch_carries_program_and_cwd() {
        let provider = PythonProvider::new(local());
        let mut target = DebugTarget::launch("app.py", ["--verbose"]);
        target.cwd = Some("/srv".into());

        let req = provider.launch_request(&target).unwrap();
        assert_eq!(req.kind, RequestKind::Launch);
        assert_eq!(req.adapter.adapter_id, "debugpy");
        assert_eq!(req.arguments["program"], "app.py");
        assert_eq!(req.arguments["args"], json!(["--verbose"]));
        assert_eq!(req.arguments["cwd"], "/srv");
    }

    #[test]
    fn python_attach_port_uses_connection_host() {
        let provider = PythonProvider::new(Arc::new(Connection::remote("devbox", None)));
        let req = provider
            .launch_request(&DebugTarget::attach_port(5678))
            .unwrap();
        assert_eq!(req.kind, RequestKind::Attach);
        assert_eq!(req.arguments["connect"]["host"], "devbox");
        assert_eq!(req.arguments["connect"]["port"], 5678);
    }

    #[test]
    fn node_attach_pid() {
        let req = NodeProvider::new(local())
            .launch_request(&DebugTarget::attach_pid(4242))
            .unwrap();
        assert_eq!(req.kind, RequestKind::Attach);
        assert_eq!(req.arguments["processId"], 4242);
    }

    #[test]
    fn empty_target_is_invalid() {
        let err = NodeProvider::new(local())
            .launch_request(&DebugTarget::default())
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidTarget { ref runtime, .. } if runtime == "node"));
    }

    #[test]
    fn react_native_defaults_to_packager_port() {
        let req = ReactNativeProvider::new(local())
            .launch_request(&DebugTarget::default())
            .unwrap();
        assert_eq!(req.kind, RequestKind::Attach);
        assert_eq!(req.arguments["port"], 8081);
    }

    #[test]
    fn react_native_rejects_pid() {
        let err = ReactNativeProvider::new(local())
            .launch_request(&DebugTarget::attach_pid(1))
            .unwrap_err();
        assert!(err.to_string().contains("packager port"));
    }

    #[tokio::test]
    async fn builtin_registration_applies_overrides() {
        let mut overrides = AdapterOverrides::new();
        overrides.insert(
            PYTHON.into(),
            AdapterCommand::new("debugpy", "/opt/py/bin/python", ["-m", "debugpy.adapter"]),
        );
        let mut registry = ProviderRegistry::new();
        register_builtin(&mut registry, &overrides, Gate::Never).unwrap();

        assert_eq!(registry.runtimes(), vec![PYTHON, NODE, REACT_NATIVE]);
        assert_eq!(registry.display_name(REACT_NATIVE), Some("React Native"));

        let provider = registry
            .resolve(PYTHON, &local())
            .await
            .unwrap()
            .into_provider()
            .unwrap();
        let req = provider
            .launch_request(&DebugTarget::launch("x.py", [""; 0]))
            .unwrap();
        assert_eq!(req.adapter.command, "/opt/py/bin/python");

        assert!(!registry
            .resolve(REACT_NATIVE, &local())
            .await
            .unwrap()
            .is_offered());
    }

    #[test]
    fn builtin_registration_twice_is_duplicate() {
        let mut registry = ProviderRegistry::new();
        register_builtin(&mut registry, &AdapterOverrides::new(), Gate::Always).unwrap();
        let err = register_builtin(&mut registry, &AdapterOverrides::new(), Gate::Always)
            .unwrap_err();
        assert!(matches!(err, ProviderError::DuplicateProvider(_)));
    }
}
