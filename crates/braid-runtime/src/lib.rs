//! # Braid Runtime
//!
//! Orchestration layer for the Braid DNS router: configuration loading,
//! logging setup, and the assembly of a registry plus entry handler from a
//! validated config.
//!
//! ```rust,ignore
//! use braid_runtime::{BraidRuntime, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BraidRuntime::from_config(load_config()?).await?;
//!     let handler = runtime.handler();
//!     // transports invoke handler.serve(...) once per query
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BraidConfig, ConfigError, load_config, load_from_file, load_from_str};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::BraidRuntime;
