//! Provider registry error types.

use thiserror::Error;

/// Errors from provider registration and resolution.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A provider is already registered under this runtime name.
    #[error("provider already registered for runtime '{0}'")]
    DuplicateProvider(String),

    /// No provider is registered under this runtime name.
    #[error("no provider registered for runtime '{0}'")]
    UnknownRuntime(String),

    /// The target cannot be debugged by this runtime's provider.
    #[error("invalid {runtime} target: {message}")]
    InvalidTarget {
        /// Runtime that refused the target.
        runtime: String,
        /// What is wrong with it.
        message: String,
    },

    /// An enablement check could not be evaluated.
    #[error("gate check '{name}' failed: {message}")]
    Gate {
        /// Name of the check.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The host refused a service registration.
    #[error("service registration failed: {0}")]
    Registration(String),
}
