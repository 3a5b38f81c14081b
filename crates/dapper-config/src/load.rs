//! Locating and layering config files.
//!
//! ```text
//!   Config::default()
//!     <- <config_dir>/config.toml        (written on first run)
//!     <- <project>/.dapper/config.toml   (nearest ancestor)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::apply_layer;
use crate::validate::validate;

const CONFIG_FILE: &str = "config.toml";
const PROJECT_DIR: &str = ".dapper";

const TEMPLATE: &str = r#"# dapper configuration
# Every setting below shows its default. Uncomment to change it.

# [session]
# request_timeout_ms = 10000
# max_consecutive_timeouts = 2
# launch_timeout_ms = 30000

# [log]
# level = "info"

# [listener]
# enabled = false
# address = "127.0.0.1:9615"

# [features]
# reactnative_debugger = false

# [adapters.python]
# command = "python3"
# args = ["-m", "debugpy.adapter"]
"#;

/// Build the effective configuration for a run started in `project_dir`.
///
/// The global file is created from a commented template if missing. The
/// merged result is validated and the first violation returned.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global = ensure_global(config_dir)?;
    let mut config = Config::default();

    if let Some(text) = read_layer(&global)? {
        config = apply_layer(&config, &text, &global.display().to_string())?;
    }
    if let Some(project) = project_dir.and_then(project_config_path) {
        tracing::debug!(path = %project.display(), "applying project config");
        if let Some(text) = read_layer(&project)? {
            config = apply_layer(&config, &text, &project.display().to_string())?;
        }
    }

    checked(config)
}

/// Load a single file over the defaults, without the global layer.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(ConfigError::access(path))?;
    checked(apply_layer(&Config::default(), &text, &path.display().to_string())?)
}

/// Parse a complete document; absent keys take their defaults.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config = toml::from_str(toml_str).map_err(|e| ConfigError::parse("<inline>", e))?;
    checked(config)
}

fn checked(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            let mut errors = errors.into_iter();
            let first = errors.next().unwrap_or_else(|| ConfigError::Validation {
                field: "config".into(),
                message: "invalid".into(),
            });
            for extra in errors {
                tracing::warn!(error = %extra, "additional config violation");
            }
            Err(first)
        }
    }
}

fn ensure_global(config_dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(config_dir).map_err(ConfigError::access(config_dir))?;
    let path = config_dir.join(CONFIG_FILE);
    if !path.exists() {
        fs::write(&path, TEMPLATE).map_err(|source| ConfigError::WriteDefault {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "wrote default config");
    }
    Ok(path)
}

/// File contents, or `None` when only comments and blank lines remain.
fn read_layer(path: &Path) -> Result<Option<String>, ConfigError> {
    let text = fs::read_to_string(path).map_err(ConfigError::access(path))?;
    Ok((!is_template_only(&text)).then_some(text))
}

fn project_config_path(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn is_template_only(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn first_run_writes_template() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");

        assert_eq!(load_config(&dir, None).unwrap(), Config::default());
        let written = fs::read_to_string(dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(written, TEMPLATE);
    }

    #[test]
    fn global_layer_applies() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");
        write(&dir.join(CONFIG_FILE), "[session]\nrequest_timeout_ms = 2500\n");

        let config = load_config(&dir, None).unwrap();
        assert_eq!(config.session.request_timeout_ms, 2500);
        assert_eq!(config.session.max_consecutive_timeouts, 2);
    }

    #[test]
    fn project_layer_wins_over_global() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");
        write(
            &dir.join(CONFIG_FILE),
            "[features]\nreactnative_debugger = true\n[listener]\nenabled = true\n",
        );
        let project = tmp.path().join("app");
        write(
            &project.join(PROJECT_DIR).join(CONFIG_FILE),
            "[features]\nreactnative_debugger = false\n",
        );

        let config = load_config(&dir, Some(&project.join("src"))).unwrap();
        assert!(!config.features.reactnative_debugger);
        assert!(config.listener.enabled);
    }

    #[test]
    fn first_violation_is_returned() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");
        write(
            &dir.join(CONFIG_FILE),
            "[session]\nmax_consecutive_timeouts = 0\nlaunch_timeout_ms = 1\n",
        );

        let err = load_config(&dir, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().starts_with("session.launch_timeout_ms"), "{err}");
    }

    #[test]
    fn parse_errors_name_the_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");
        write(&dir.join(CONFIG_FILE), "[session\n");

        let err = load_config(&dir, None).unwrap_err();
        assert!(err.to_string().contains("config.toml"), "{err}");
    }

    #[test]
    fn explicit_file_must_exist() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_file(&tmp.path().join("nope.toml")),
            Err(ConfigError::NotFound(_))
        ));

        let path = tmp.path().join("dapper.toml");
        write(&path, "[log]\nlevel = \"debug\"\n");
        assert_eq!(load_file(&path).unwrap().log.level, LogLevel::Debug);
    }

    #[test]
    fn inline_documents() {
        let config = load_from_str("[session]\nlaunch_timeout_ms = 5000\n").unwrap();
        assert_eq!(config.session.launch_timeout_ms, 5000);
        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn project_lookup_walks_ancestors() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        write(&root.join(PROJECT_DIR).join(CONFIG_FILE), "[log]\nlevel = \"warn\"\n");
        let deep = root.join("src").join("module");
        fs::create_dir_all(&deep).unwrap();

        assert_eq!(
            project_config_path(&deep),
            Some(root.join(PROJECT_DIR).join(CONFIG_FILE))
        );
        assert_eq!(project_config_path(tmp.path()), None);
    }

    #[test]
    fn template_counts_as_empty() {
        assert!(is_template_only(TEMPLATE));
        assert!(is_template_only(""));
        assert!(!is_template_only("# comment\n[log]\n"));
    }
}
