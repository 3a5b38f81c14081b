use std::net::SocketAddr;

use crate::config::Config;
use crate::error::ConfigError;

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 600_000;

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    check_timeout(
        &mut errors,
        "session.request_timeout_ms",
        config.session.request_timeout_ms,
    );
    check_timeout(
        &mut errors,
        "session.launch_timeout_ms",
        config.session.launch_timeout_ms,
    );

    if config.session.max_consecutive_timeouts == 0 {
        errors.push(ConfigError::Validation {
            field: "session.max_consecutive_timeouts".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.listener.address.parse::<SocketAddr>().is_err() {
        errors.push(ConfigError::Validation {
            field: "listener.address".to_string(),
            message: format!("not a socket address: '{}'", config.listener.address),
        });
    }

    let mut runtimes: Vec<&String> = config.adapters.keys().collect();
    runtimes.sort();
    for runtime in runtimes {
        if config.adapters[runtime].command.trim().is_empty() {
            errors.push(ConfigError::Validation {
                field: format!("adapters.{runtime}.command"),
                message: "must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_timeout(errors: &mut Vec<ConfigError>, field: &str, value: u64) {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message: format!("must be {MIN_TIMEOUT_MS}..={MAX_TIMEOUT_MS}, got {value}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterEntry;

    #[test]
    fn valid_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn request_timeout_bounds() {
        let mut cfg = Config::default();
        cfg.session.request_timeout_ms = 99;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].to_string().contains("session.request_timeout_ms"));

        cfg.session.request_timeout_ms = 100;
        assert!(validate(&cfg).is_ok());
        cfg.session.request_timeout_ms = 600_000;
        assert!(validate(&cfg).is_ok());
        cfg.session.request_timeout_ms = 600_001;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_max_timeouts_rejected() {
        let mut cfg = Config::default();
        cfg.session.max_consecutive_timeouts = 0;
        let errs = validate(&cfg).unwrap_err();
        assert!(errs[0].to_string().contains("must be at least 1"));
    }

    #[test]
    fn listener_address_must_parse() {
        let mut cfg = Config::default();
        cfg.listener.address = "localhost".into();
        let errs = validate(&cfg).unwrap_err();
        assert!(errs[0].to_string().contains("listener.address"));
    }

    #[test]
    fn empty_adapter_command_rejected() {
        let mut cfg = Config::default();
        cfg.adapters.insert(
            "node".into(),
            AdapterEntry {
                command: "  ".into(),
                args: Vec::new(),
            },
        );
        let errs = validate(&cfg).unwrap_err();
        assert!(errs[0].to_string().contains("adapters.node.command"));
    }

    #[test]
    fn multiple_errors_returned() {
        let mut cfg = Config::default();
        cfg.session.request_timeout_ms = 0;
        cfg.session.launch_timeout_ms = 0;
        cfg.session.max_consecutive_timeouts = 0;
        cfg.listener.address = String::new();
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 4);
    }
}
