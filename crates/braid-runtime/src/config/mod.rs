//! Configuration loading, schema, and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_from_file, load_from_str};
pub use schema::{BraidConfig, LogConfig, PluginEntry, ServerConfig};
pub use validation::validate_config;
