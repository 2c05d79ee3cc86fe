//! Configuration loading.
//!
//! A Braid process reads one YAML document. [`load_config`] probes the
//! working directory for `braid.yaml`/`braid.yml`; [`load_from_file`] and
//! [`load_from_str`] take an explicit source. All three expand `${VAR}` /
//! `${VAR:-default}` references from the environment and run the
//! validation pass before returning.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::BraidConfig;
use super::validation::validate_config;

/// File names probed, in order, when no path is given explicitly.
const CONFIG_FILE_NAMES: &[&str] = &["braid.yaml", "braid.yml"];

/// Loads the process configuration from the working directory.
///
/// A missing file is not an error: the built-in defaults are returned and
/// validation of the (empty) entry happens when the runtime is assembled.
pub fn load_config() -> ConfigResult<BraidConfig> {
    match discover_config_file() {
        Some(path) => load_from_file(path),
        None => {
            info!("No configuration file found, using defaults");
            Ok(BraidConfig::default())
        }
    }
}

/// Loads and validates the configuration at `path`.
pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<BraidConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    info!("Loading configuration from {}", path.display());

    let content = std::fs::read_to_string(path)?;
    let config = load_from_str(&content)?;
    debug!(
        plugins = config.plugins.len(),
        entry = %config.server.entry,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parses and validates a YAML configuration document.
pub fn load_from_str(yaml: &str) -> ConfigResult<BraidConfig> {
    let expanded = expand_env(yaml);
    let config: BraidConfig = serde_yaml::from_str(&expanded)?;
    validate_config(&config)?;
    Ok(config)
}

fn discover_config_file() -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| cwd.join(name))
        .find(|path| path.exists())
}

/// Expands `${VAR}` and `${VAR:-default}` references in a single pass.
///
/// Unset variables without a default become empty. Each reference is
/// substituted exactly once; text brought in by a substitution is never
/// rescanned, so a value that itself contains `${...}` stays literal.
fn expand_env(content: &str) -> String {
    let reference = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
    reference
        .replace_all(content, |caps: &regex_lite::Captures<'_>| {
            match env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string(),
            }
        })
        .into_owned()
}
