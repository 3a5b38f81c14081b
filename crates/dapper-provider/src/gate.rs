//! Enablement predicates for conditional providers.
//!
//! A [`Gate`] composes asynchronous [`GateCheck`]s. Every check in a
//! composite is awaited before the gate decides, and a check that fails is
//! logged and counted as `false`.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;

/// One asynchronous yes/no question (feature flag, environment probe).
#[async_trait]
pub trait GateCheck: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Evaluate the check.
    async fn check(&self) -> Result<bool, ProviderError>;
}

/// Enablement predicate attached to a registry entry.
#[derive(Clone)]
pub enum Gate {
    /// Always enabled.
    Always,
    /// Never enabled.
    Never,
    /// Enabled when the check passes.
    Check(Arc<dyn GateCheck>),
    /// Enabled when any member is; all members are evaluated.
    AnyOf(Vec<Gate>),
    /// Enabled when every member is; all members are evaluated.
    AllOf(Vec<Gate>),
    /// Inverts the inner gate.
    Not(Box<Gate>),
}

impl Gate {
    /// Wrap a single check.
    pub fn check(check: impl GateCheck + 'static) -> Self {
        Gate::Check(Arc::new(check))
    }

    /// Enabled when any of `gates` is.
    pub fn any_of(gates: impl IntoIterator<Item = Gate>) -> Self {
        Gate::AnyOf(gates.into_iter().collect())
    }

    /// Enabled when all of `gates` are.
    pub fn all_of(gates: impl IntoIterator<Item = Gate>) -> Self {
        Gate::AllOf(gates.into_iter().collect())
    }

    /// Inverse of `gate`.
    pub fn not(gate: Gate) -> Self {
        Gate::Not(Box::new(gate))
    }

    /// Decide whether the gated entry is offered.
    pub fn evaluate(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match self {
                Gate::Always => true,
                Gate::Never => false,
                Gate::Check(check) => match check.check().await {
                    Ok(enabled) => {
                        tracing::debug!(gate = check.name(), enabled, "gate evaluated");
                        enabled
                    }
                    Err(e) => {
                        tracing::warn!(gate = check.name(), error = %e, "gate check failed, treating as disabled");
                        false
                    }
                },
                Gate::AnyOf(gates) => {
                    let mut enabled = false;
                    for gate in gates {
                        enabled |= gate.evaluate().await;
                    }
                    enabled
                }
                Gate::AllOf(gates) => {
                    let mut enabled = true;
                    for gate in gates {
                        enabled &= gate.evaluate().await;
                    }
                    enabled
                }
                Gate::Not(gate) => !gate.evaluate().await,
            }
        })
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gate::Always => f.write_str("Always"),
            Gate::Never => f.write_str("Never"),
            Gate::Check(check) => write!(f, "Check({})", check.name()),
            Gate::AnyOf(gates) => f.debug_tuple("AnyOf").field(gates).finish(),
            Gate::AllOf(gates) => f.debug_tuple("AllOf").field(gates).finish(),
            Gate::Not(gate) => f.debug_tuple("Not").field(gate).finish(),
        }
    }
}

/// An experiment flag resolved from configuration.
#[derive(Debug, Clone)]
pub struct FeatureFlag {
    name: String,
    enabled: bool,
}

impl FeatureFlag {
    /// Flag `name` with a fixed value.
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }
}

#[async_trait]
impl GateCheck for FeatureFlag {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<bool, ProviderError> {
        Ok(self.enabled)
    }
}

/// Passes when the proprietary companion module is absent.
#[derive(Debug, Clone)]
pub struct OpenSourceBuild {
    companion_module: PathBuf,
}

impl OpenSourceBuild {
    /// Probe for `companion_module`.
    pub fn new(companion_module: impl Into<PathBuf>) -> Self {
        Self {
            companion_module: companion_module.into(),
        }
    }
}

#[async_trait]
impl GateCheck for OpenSourceBuild {
    fn name(&self) -> &str {
        "open-source-build"
    }

    async fn check(&self) -> Result<bool, ProviderError> {
        let present = tokio::fs::try_exists(&self.companion_module)
            .await
            .map_err(|e| ProviderError::Gate {
                name: self.name().to_string(),
                message: format!("{}: {e}", self.companion_module.display()),
            })?;
        Ok(!present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Broken;

    #[async_trait]
    impl GateCheck for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check(&self) -> Result<bool, ProviderError> {
            Err(ProviderError::Gate {
                name: "broken".into(),
                message: "network down".into(),
            })
        }
    }

    struct Counting(Arc<AtomicUsize>, bool);

    #[async_trait]
    impl GateCheck for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn check(&self) -> Result<bool, ProviderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(self.1)
        }
    }

    #[tokio::test]
    async fn constant_gates() {
        assert!(Gate::Always.evaluate().await);
        assert!(!Gate::Never.evaluate().await);
        assert!(!Gate::not(Gate::Always).evaluate().await);
    }

    #[tokio::test]
    async fn feature_flag_reports_value() {
        assert!(Gate::check(FeatureFlag::new("x", true)).evaluate().await);
        assert!(!Gate::check(FeatureFlag::new("x", false)).evaluate().await);
    }

    #[tokio::test]
    async fn failing_check_counts_as_disabled() {
        assert!(!Gate::check(Broken).evaluate().await);
        assert!(Gate::any_of([Gate::check(Broken), Gate::Always]).evaluate().await);
    }

    #[tokio::test]
    async fn any_of_awaits_every_member() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Gate::any_of([
            Gate::check(Counting(Arc::clone(&calls), true)),
            Gate::check(Counting(Arc::clone(&calls), false)),
        ]);
        assert!(gate.evaluate().await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_of_requires_every_member() {
        let gate = Gate::all_of([Gate::Always, Gate::check(FeatureFlag::new("x", false))]);
        assert!(!gate.evaluate().await);
        assert!(Gate::all_of([Gate::Always, Gate::Always]).evaluate().await);
    }

    #[tokio::test]
    async fn open_source_build_probes_filesystem() {
        let tmp = tempfile::TempDir::new().unwrap();
        let module = tmp.path().join("companion.js");

        assert!(OpenSourceBuild::new(&module).check().await.unwrap());
        std::fs::write(&module, "// internal").unwrap();
        assert!(!OpenSourceBuild::new(&module).check().await.unwrap());
    }

    #[test]
    fn gate_debug_names_checks() {
        let gate = Gate::any_of([Gate::check(FeatureFlag::new("rn", true)), Gate::Never]);
        assert_eq!(format!("{gate:?}"), "AnyOf([Check(rn), Never])");
    }
}
