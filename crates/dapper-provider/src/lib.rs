//! dapper-provider — runtime launch/attach providers and their registry.
//!
//! A provider turns a [`DebugTarget`] into the adapter configuration for
//! one runtime. Providers are registered once at startup, optionally
//! behind a [`Gate`], and resolved per connection.
pub mod error;
pub mod gate;
pub mod provider;
pub mod registry;
pub mod runtimes;
pub mod service;

pub use error::ProviderError;
pub use gate::{FeatureFlag, Gate, GateCheck, OpenSourceBuild};
pub use provider::{DebugTarget, LaunchAttachProvider};
pub use registry::{ProviderRegistry, Resolution};
pub use runtimes::{register_builtin, AdapterOverrides, NODE, PYTHON, REACT_NATIVE};
pub use service::{
    publish_providers, DebuggerProviderService, Publication, ServiceDirectory, ServicePort,
    ServiceRegistration, PROVIDER_SERVICE_NAME, PROVIDER_SERVICE_VERSION,
};
