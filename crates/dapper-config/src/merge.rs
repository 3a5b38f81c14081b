//! Layering of partial TOML documents over a [`Config`].

use toml::{Table, Value};

use crate::config::Config;
use crate::error::ConfigError;

/// Apply the TOML `fragment` on top of `base`.
///
/// Keys present in the fragment win; nested tables such as
/// `[adapters.python]` are merged key by key rather than replaced.
/// `origin` names the fragment in error messages.
pub fn apply_layer(base: &Config, fragment: &str, origin: &str) -> Result<Config, ConfigError> {
    let layer = fragment
        .parse::<Table>()
        .map_err(|e| ConfigError::parse(origin, e))?;
    let mut merged = match Value::try_from(base).map_err(|e| ConfigError::parse(origin, e))? {
        Value::Table(table) => table,
        _ => Table::new(),
    };
    overlay(&mut merged, layer);
    Value::Table(merged)
        .try_into()
        .map_err(|e| ConfigError::parse(origin, e))
}

fn overlay(into: &mut Table, layer: Table) {
    for (key, value) in layer {
        match (into.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => overlay(existing, nested),
            (_, value) => {
                into.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layer_is_identity() {
        let base = Config::default();
        assert_eq!(apply_layer(&base, "", "<inline>").unwrap(), base);
    }

    #[test]
    fn layer_overrides_single_key() {
        let base = Config::default();
        let merged = apply_layer(&base, "[session]\nrequest_timeout_ms = 750\n", "<inline>").unwrap();
        assert_eq!(merged.session.request_timeout_ms, 750);
        assert_eq!(merged.session.launch_timeout_ms, base.session.launch_timeout_ms);
    }

    #[test]
    fn adapter_tables_merge_per_runtime() {
        let global = apply_layer(
            &Config::default(),
            "[adapters.python]\ncommand = \"python3\"\nargs = [\"-m\", \"debugpy.adapter\"]\n",
            "global",
        )
        .unwrap();
        let merged = apply_layer(
            &global,
            "[adapters.python]\ncommand = \"python3.12\"\n[adapters.node]\ncommand = \"js-debug\"\n",
            "project",
        )
        .unwrap();
        assert_eq!(merged.adapters["python"].command, "python3.12");
        assert_eq!(merged.adapters["python"].args.len(), 2);
        assert_eq!(merged.adapters["node"].command, "js-debug");
    }

    #[test]
    fn untouched_sections_survive() {
        let base = Config::default();
        let merged = apply_layer(&base, "[features]\nreactnative_debugger = true\n", "x").unwrap();
        assert!(merged.features.reactnative_debugger);
        assert_eq!(merged.session, base.session);
        assert_eq!(merged.listener, base.listener);
    }

    #[test]
    fn bad_layer_reports_origin() {
        let err = apply_layer(&Config::default(), "{{invalid}}", "/p/.dapper/config.toml").unwrap_err();
        assert!(matches!(&err, ConfigError::Parse { origin, .. } if origin == "/p/.dapper/config.toml"));
    }

    #[test]
    fn wrong_type_is_a_parse_error() {
        let err = apply_layer(&Config::default(), "[session]\nrequest_timeout_ms = \"soon\"\n", "x");
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }
}
