//! Startup wiring from [`Config`] to the debugger core.

use anyhow::{Context, Result};
use dapper_config::Config;
use dapper_dap::{AdapterCommand, SessionOptions};
use dapper_provider::{
    register_builtin, AdapterOverrides, FeatureFlag, Gate, OpenSourceBuild, ProviderRegistry,
};

/// Session deadlines from `[session]`.
pub fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        request_timeout: config.session.request_timeout(),
        launch_timeout: config.session.launch_timeout(),
        max_consecutive_timeouts: config.session.max_consecutive_timeouts,
    }
}

/// Adapter commands from `[adapters.<runtime>]`.
pub fn adapter_overrides(config: &Config) -> AdapterOverrides {
    config
        .adapters
        .iter()
        .map(|(runtime, entry)| {
            (
                runtime.clone(),
                AdapterCommand::new(
                    runtime.as_str(),
                    entry.command.as_str(),
                    entry.args.iter().cloned(),
                ),
            )
        })
        .collect()
}

/// React Native is offered when the experiment flag is on or this is an
/// open-source build.
pub fn reactnative_gate(config: &Config) -> Gate {
    Gate::any_of([
        Gate::check(FeatureFlag::new(
            "reactnative_debugger",
            config.features.reactnative_debugger,
        )),
        Gate::check(OpenSourceBuild::new(&config.build.companion_module)),
    ])
}

/// Registry holding the built-in providers.
pub fn build_registry(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    register_builtin(
        &mut registry,
        &adapter_overrides(config),
        reactnative_gate(config),
    )
    .context("failed to register built-in providers")?;
    Ok(registry)
}
