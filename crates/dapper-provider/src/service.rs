//! Publishing providers to a host service port.
//!
//! The host decides how services travel; dapper only sees [`ServicePort`].
//! Every registration is withdrawn when its handle is dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dapper_dap::Connection;

use crate::error::ProviderError;
use crate::provider::LaunchAttachProvider;
use crate::registry::{ProviderFactory, ProviderRegistry};

/// Service name providers are published under.
pub const PROVIDER_SERVICE_NAME: &str = "debugger.provider";
/// Version of the provider service contract.
pub const PROVIDER_SERVICE_VERSION: &str = "0.0.0";

/// The object handed to the host for one runtime.
#[derive(Clone)]
pub struct DebuggerProviderService {
    runtime: String,
    name: String,
    factory: ProviderFactory,
}

impl DebuggerProviderService {
    pub(crate) fn new(runtime: &str, name: &str, factory: ProviderFactory) -> Self {
        Self {
            runtime: runtime.to_string(),
            name: name.to_string(),
            factory,
        }
    }

    /// Registry key of the runtime.
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Display name, e.g. `React Native`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A provider bound to `connection`.
    pub fn launch_attach_provider(
        &self,
        connection: Arc<Connection>,
    ) -> Arc<dyn LaunchAttachProvider> {
        (self.factory)(connection)
    }
}

impl std::fmt::Debug for DebuggerProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerProviderService")
            .field("runtime", &self.runtime)
            .field("name", &self.name)
            .finish()
    }
}

/// Where services are published.
pub trait ServicePort: Send + Sync {
    /// Publish `service` under `name`/`version`.
    fn provide(
        &self,
        name: &str,
        version: &str,
        service: DebuggerProviderService,
    ) -> Result<ServiceRegistration, ProviderError>;
}

/// Handle to one published service; withdraws it on drop.
pub struct ServiceRegistration {
    runtime: String,
    withdraw: Option<Box<dyn FnOnce() + Send>>,
}

impl ServiceRegistration {
    /// Registration that runs `withdraw` when released.
    pub fn new(runtime: impl Into<String>, withdraw: impl FnOnce() + Send + 'static) -> Self {
        Self {
            runtime: runtime.into(),
            withdraw: Some(Box::new(withdraw)),
        }
    }

    /// Runtime of the published service.
    pub fn runtime(&self) -> &str {
        &self.runtime
    }
}

impl Drop for ServiceRegistration {
    fn drop(&mut self) {
        if let Some(withdraw) = self.withdraw.take() {
            tracing::debug!(runtime = %self.runtime, "withdrawing provider service");
            withdraw();
        }
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("runtime", &self.runtime)
            .finish()
    }
}

/// Every registration made by one [`publish_providers`] call.
#[derive(Debug, Default)]
pub struct Publication {
    registrations: Vec<ServiceRegistration>,
}

impl Publication {
    /// Runtimes that were published.
    pub fn published(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.runtime()).collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Withdraw everything now, in reverse publication order.
    pub fn withdraw(mut self) {
        while let Some(registration) = self.registrations.pop() {
            drop(registration);
        }
    }
}

/// Publish every offered provider in `registry` to `port`.
///
/// Gates are evaluated once, here. If the port refuses a registration, the
/// ones already made are withdrawn and the error is returned.
pub async fn publish_providers(
    registry: &ProviderRegistry,
    port: &dyn ServicePort,
) -> Result<Publication, ProviderError> {
    let mut publication = Publication::default();
    for runtime in registry.runtimes() {
        if !registry.is_offered(runtime).await? {
            tracing::info!(runtime, "provider not offered, skipping");
            continue;
        }
        let Some(service) = registry.service(runtime) else {
            continue;
        };
        let registration =
            port.provide(PROVIDER_SERVICE_NAME, PROVIDER_SERVICE_VERSION, service)?;
        tracing::info!(runtime, "provider published");
        publication.registrations.push(registration);
    }
    Ok(publication)
}

#[derive(Default)]
struct DirectoryState {
    next_id: u64,
    entries: BTreeMap<u64, (String, String, DebuggerProviderService)>,
}

/// In-process [`ServicePort`] that keeps published services in a table.
#[derive(Clone, Default)]
pub struct ServiceDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services published under `name`, in publication order.
    pub fn services(&self, name: &str) -> Vec<DebuggerProviderService> {
        match self.state.lock() {
            Ok(state) => state
                .entries
                .values()
                .filter(|(n, _, _)| n == name)
                .map(|(_, _, service)| service.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The service for `runtime` under `name`.
    pub fn find(&self, name: &str, runtime: &str) -> Option<DebuggerProviderService> {
        self.services(name)
            .into_iter()
            .find(|s| s.runtime() == runtime)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServicePort for ServiceDirectory {
    fn provide(
        &self,
        name: &str,
        version: &str,
        service: DebuggerProviderService,
    ) -> Result<ServiceRegistration, ProviderError> {
        let runtime = service.runtime().to_string();
        let id = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ProviderError::Registration("service directory poisoned".into()))?;
            let id = state.next_id;
            state.next_id += 1;
            state
                .entries
                .insert(id, (name.to_string(), version.to_string(), service));
            id
        };
        let state = Arc::clone(&self.state);
        Ok(ServiceRegistration::new(runtime, move || {
            if let Ok(mut state) = state.lock() {
                state.entries.remove(&id);
            }
        }))
    }
}

impl std::fmt::Debug for ServiceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDirectory")
            .field("len", &self.len())
            .finish()
    }
}
