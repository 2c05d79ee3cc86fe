//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::BraidConfig;
use std::collections::HashSet;

/// Validates the entire configuration.
pub fn validate_config(config: &BraidConfig) -> ConfigResult<()> {
    validate_log_config(config)?;
    validate_server_config(config)?;
    validate_plugins_config(config)?;
    Ok(())
}

fn validate_log_config(config: &BraidConfig) -> ConfigResult<()> {
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.log.level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "invalid log level: {}. Valid values are: {:?}",
            config.log.level, valid_log_levels
        )));
    }
    Ok(())
}

fn validate_server_config(config: &BraidConfig) -> ConfigResult<()> {
    if config.server.entry.is_empty() {
        return Err(ConfigError::missing_field("server.entry"));
    }

    // The entry must be a configured plugin or a preregistered sentinel.
    let defined = config
        .plugins
        .iter()
        .any(|p| p.tag == config.server.entry);
    if !defined && !config.server.entry.starts_with('_') {
        return Err(ConfigError::validation(format!(
            "server.entry '{}' does not name a configured plugin",
            config.server.entry
        )));
    }
    Ok(())
}

fn validate_plugins_config(config: &BraidConfig) -> ConfigResult<()> {
    let mut seen_tags = HashSet::new();

    for plugin in &config.plugins {
        if plugin.tag.is_empty() {
            return Err(ConfigError::missing_field("plugins[].tag"));
        }
        if plugin.plugin_type.is_empty() {
            return Err(ConfigError::missing_field("plugins[].type"));
        }
        if plugin.tag.starts_with('_') {
            return Err(ConfigError::ReservedTag(plugin.tag.clone()));
        }
        if plugin.tag.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "plugin tag '{}' must not contain whitespace",
                plugin.tag
            )));
        }
        if !seen_tags.insert(&plugin.tag) {
            return Err(ConfigError::DuplicateTag(plugin.tag.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PluginEntry;

    fn plugin(tag: &str) -> PluginEntry {
        PluginEntry {
            tag: tag.to_string(),
            plugin_type: "sequence".to_string(),
            args: serde_yaml::Value::Null,
        }
    }

    fn base_config() -> BraidConfig {
        BraidConfig {
            server: crate::config::schema::ServerConfig {
                entry: "main".to_string(),
                max_concurrent_queries: 0,
            },
            plugins: vec![plugin("main")],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = base_config();
        config.log.level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_entry() {
        let mut config = base_config();
        config.server.entry.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_undefined_entry() {
        let mut config = base_config();
        config.server.entry = "ghost".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_sentinel_entry_is_allowed() {
        let mut config = base_config();
        config.server.entry = "_block_with_nxdomain".to_string();
        config.plugins.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_tag() {
        let mut config = base_config();
        config.plugins.push(plugin("main"));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateTag(_))
        ));
    }

    #[test]
    fn test_reserved_tag_rejected() {
        let mut config = base_config();
        config.plugins.push(plugin("_sneaky"));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ReservedTag(_))
        ));
    }
}
