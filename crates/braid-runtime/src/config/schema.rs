//! Configuration schema.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! BraidConfig
//! ├── log: LogConfig            # Logging settings
//! ├── server: ServerConfig      # Entry tag and limits
//! └── plugins: [PluginEntry]    # Plugin instances (tag/type/args)
//! ```
//!
//! # Example Configuration (YAML)
//!
//! ```yaml
//! log:
//!   level: debug
//!
//! server:
//!   entry: main
//!   max_concurrent_queries: 1024
//!
//! plugins:
//!   - tag: main
//!     type: sequence
//!     args:
//!       exec:
//!         - { if: ["local_names"], exec: [local_forward] }
//!         - upstream_forward
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration for a Braid process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BraidConfig {
    /// Logging configuration.
    pub log: LogConfig,

    /// Server-handler configuration.
    pub server: ServerConfig,

    /// Plugin instances, loaded in order.
    pub plugins: Vec<PluginEntry>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, or error.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Server-handler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Tag of the entry plugin every query starts at.
    pub entry: String,

    /// Concurrent-query cap; 0 disables the limiter.
    pub max_concurrent_queries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            entry: String::new(),
            max_concurrent_queries: 0,
        }
    }
}

/// One plugin instance.
///
/// `args` stays untyped here; each plugin type weakly decodes its own
/// section through its factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Unique tag the plugin is registered under.
    pub tag: String,

    /// Plugin type (factory name).
    #[serde(rename = "type")]
    pub plugin_type: String,

    /// Raw plugin arguments.
    #[serde(default)]
    pub args: serde_yaml::Value,
}
