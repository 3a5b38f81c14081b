//! Provider registry: runtime name to gated provider factory.
//!
//! The registry is filled once at startup and then shared read-only.
//! Entries are never removed or replaced.
use std::sync::Arc;

use dapper_dap::Connection;

use crate::error::ProviderError;
use crate::gate::Gate;
use crate::provider::LaunchAttachProvider;
use crate::service::DebuggerProviderService;

/// Builds a provider bound to one connection.
pub type ProviderFactory =
    Arc<dyn Fn(Arc<Connection>) -> Arc<dyn LaunchAttachProvider> + Send + Sync>;

struct ProviderEntry {
    runtime: String,
    display_name: String,
    factory: ProviderFactory,
    gate: Gate,
}

/// Outcome of resolving a runtime for a connection.
pub enum Resolution {
    /// The entry is enabled; here is a fresh provider.
    Offered(Arc<dyn LaunchAttachProvider>),
    /// The entry exists but its gate is closed.
    NotOffered,
}

impl Resolution {
    /// Whether a provider was produced.
    pub fn is_offered(&self) -> bool {
        matches!(self, Resolution::Offered(_))
    }

    /// The provider, if offered.
    pub fn into_provider(self) -> Option<Arc<dyn LaunchAttachProvider>> {
        match self {
            Resolution::Offered(provider) => Some(provider),
            Resolution::NotOffered => None,
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Offered(provider) => write!(f, "Offered({})", provider.runtime()),
            Resolution::NotOffered => f.write_str("NotOffered"),
        }
    }
}

/// Append-only table of runtime providers.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `runtime`, offered only while `gate` passes.
    ///
    /// Fails with [`ProviderError::DuplicateProvider`] if `runtime` is taken.
    pub fn register<F>(
        &mut self,
        runtime: &str,
        display_name: &str,
        factory: F,
        gate: Gate,
    ) -> Result<(), ProviderError>
    where
        F: Fn(Arc<Connection>) -> Arc<dyn LaunchAttachProvider> + Send + Sync + 'static,
    {
        if self.contains(runtime) {
            return Err(ProviderError::DuplicateProvider(runtime.to_string()));
        }
        tracing::debug!(runtime, ?gate, "registered provider");
        self.entries.push(ProviderEntry {
            runtime: runtime.to_string(),
            display_name: display_name.to_string(),
            factory: Arc::new(factory),
            gate,
        });
        Ok(())
    }

    /// Register a provider that is always offered.
    pub fn register_unconditional<F>(
        &mut self,
        runtime: &str,
        display_name: &str,
        factory: F,
    ) -> Result<(), ProviderError>
    where
        F: Fn(Arc<Connection>) -> Arc<dyn LaunchAttachProvider> + Send + Sync + 'static,
    {
        self.register(runtime, display_name, factory, Gate::Always)
    }

    /// Whether `runtime` has an entry.
    pub fn contains(&self, runtime: &str) -> bool {
        self.entry(runtime).is_some()
    }

    /// Registered runtime names, in registration order.
    pub fn runtimes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.runtime.as_str()).collect()
    }

    /// Human-readable name for `runtime`.
    pub fn display_name(&self, runtime: &str) -> Option<&str> {
        self.entry(runtime).map(|e| e.display_name.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the gate of `runtime`.
    pub async fn is_offered(&self, runtime: &str) -> Result<bool, ProviderError> {
        let entry = self
            .entry(runtime)
            .ok_or_else(|| ProviderError::UnknownRuntime(runtime.to_string()))?;
        Ok(entry.gate.evaluate().await)
    }

    /// Resolve `runtime` for `connection`.
    ///
    /// A closed gate yields [`Resolution::NotOffered`], not an error. Each
    /// call builds a new provider instance.
    pub async fn resolve(
        &self,
        runtime: &str,
        connection: &Arc<Connection>,
    ) -> Result<Resolution, ProviderError> {
        let entry = self
            .entry(runtime)
            .ok_or_else(|| ProviderError::UnknownRuntime(runtime.to_string()))?;
        if !entry.gate.evaluate().await {
            tracing::debug!(runtime, %connection, "provider not offered");
            return Ok(Resolution::NotOffered);
        }
        let provider = (entry.factory)(Arc::clone(connection));
        tracing::debug!(runtime, %connection, "provider resolved");
        Ok(Resolution::Offered(provider))
    }

    /// Service object for `runtime`, as handed to a host port.
    pub fn service(&self, runtime: &str) -> Option<DebuggerProviderService> {
        self.entry(runtime).map(|e| {
            DebuggerProviderService::new(&e.runtime, &e.display_name, Arc::clone(&e.factory))
        })
    }

    fn entry(&self, runtime: &str) -> Option<&ProviderEntry> {
        self.entries.iter().find(|e| e.runtime == runtime)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("runtimes", &self.runtimes())
            .finish()
    }
}
