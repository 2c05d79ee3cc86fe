//! Runtime orchestration.
//!
//! [`BraidRuntime`] turns a validated [`BraidConfig`] into a ready server
//! handler:
//!
//! 1. Initializes logging (once per process) at the configured level.
//! 2. Creates a fresh registry and installs the built-in plugin types and
//!    the reserved sentinel tags.
//! 3. Instantiates every configured plugin in order through its factory
//!    and registers it, failing on duplicate tags.
//! 4. Resolves the entry handler with the configured concurrency limit.
//!
//! Transports call [`handler()`](BraidRuntime::handler) and invoke
//! `serve` once per inbound query; [`shutdown`](BraidRuntime::shutdown)
//! tears every service plugin down.
//!
//! # Example
//!
//! ```rust,ignore
//! use braid_runtime::{BraidRuntime, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BraidRuntime::from_config(load_config()?).await?;
//!     let handler = runtime.handler();
//!     // hand `handler` to the UDP/TCP listeners…
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use braid_engine::builtin::{register_builtin_types, register_sentinels};
use braid_engine::handler::ServerHandler;
use braid_engine::registry::Registry;

use crate::config::{BraidConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A fully assembled Braid process: registry, plugins, and entry handler.
#[derive(Debug)]
pub struct BraidRuntime {
    config: BraidConfig,
    registry: Registry,
    handler: Arc<ServerHandler>,
}

impl BraidRuntime {
    /// Builds a runtime from `config`.
    ///
    /// Validates the configuration, registers built-ins, and instantiates
    /// every configured plugin in order. Fails fast on the first plugin
    /// that cannot be constructed.
    pub async fn from_config(config: BraidConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_with_filter(&config.log.level);

        let registry = Registry::new();
        register_builtin_types(&registry);
        register_sentinels(&registry).await?;

        for entry in &config.plugins {
            let args = serde_json::to_value(&entry.args).map_err(|e| {
                RuntimeError::BadPluginArgs {
                    tag: entry.tag.clone(),
                    reason: e.to_string(),
                }
            })?;
            let wrapper = registry
                .new_plugin(&entry.tag, &entry.plugin_type, args)
                .await?;
            registry.register(wrapper, true).await?;
            info!(tag = %entry.tag, plugin_type = %entry.plugin_type, "Loaded plugin");
        }

        let handler = Arc::new(
            ServerHandler::new(registry.clone(), &config.server.entry)
                .with_concurrency_limit(config.server.max_concurrent_queries),
        );
        debug!(
            entry = %config.server.entry,
            plugins = registry.len(),
            "Runtime assembled"
        );

        Ok(Self {
            config,
            registry,
            handler,
        })
    }

    /// Returns the per-query entry handler for transports.
    pub fn handler(&self) -> Arc<ServerHandler> {
        self.handler.clone()
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the configuration this runtime was built from.
    pub fn config(&self) -> &BraidConfig {
        &self.config
    }

    /// Blocks until Ctrl-C, then shuts the runtime down.
    ///
    /// Daemon binaries call this after handing the handler to their
    /// listeners.
    pub async fn run_until_shutdown(&self) -> RuntimeResult<()> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Shuts down every registered plugin, including services.
    pub async fn shutdown(&self) {
        info!("Shutting down {} plugin(s)", self.registry.len());
        self.registry.purge().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use async_trait::async_trait;
    use braid_core::context::{ClientMeta, QueryContext, QueryStatus};
    use braid_core::message::{Message, Question, Rcode, RecordType};
    use braid_engine::handler::ResponseWriter;
    use tokio_util::sync::CancellationToken;

    struct CollectWriter {
        written: Vec<Message>,
    }

    #[async_trait]
    impl ResponseWriter for CollectWriter {
        async fn write(&mut self, msg: &Message) -> std::io::Result<usize> {
            self.written.push(msg.clone());
            Ok(0)
        }
    }

    fn qctx_for(name: &str) -> QueryContext {
        QueryContext::new(
            Message::query(Question::new(name, RecordType::A)).with_id(0x4242),
            ClientMeta::default(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_block_with_nxdomain() {
        let yaml = r#"
server:
  entry: main
plugins:
  - tag: main
    type: sequence
    args:
      exec: ["_block_with_nxdomain"]
"#;
        let config = load_from_str(yaml).unwrap();
        let runtime = BraidRuntime::from_config(config).await.unwrap();

        let mut qctx = qctx_for("blocked.example.");
        let mut writer = CollectWriter { written: Vec::new() };
        runtime
            .handler()
            .serve(&CancellationToken::new(), &mut qctx, &mut writer)
            .await;

        assert_eq!(writer.written.len(), 1);
        assert_eq!(writer.written[0].header.rcode, Rcode::NxDomain);
        assert_eq!(writer.written[0].header.id, 0x4242);
        assert_eq!(qctx.status(), QueryStatus::Rejected);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_entry_chain_error_yields_servfail() {
        // The sequence references a tag nobody registered.
        let yaml = r#"
server:
  entry: main
plugins:
  - tag: main
    type: sequence
    args:
      exec: ["missing_upstream"]
"#;
        let config = load_from_str(yaml).unwrap();
        let runtime = BraidRuntime::from_config(config).await.unwrap();

        let mut qctx = qctx_for("example.org.");
        let mut writer = CollectWriter { written: Vec::new() };
        runtime
            .handler()
            .serve(&CancellationToken::new(), &mut qctx, &mut writer)
            .await;

        assert_eq!(writer.written.len(), 1);
        assert_eq!(writer.written[0].header.rcode, Rcode::ServFail);
        assert_eq!(
            writer.written[0].question,
            qctx.original_query().question
        );

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_plugin_type_fails_at_load() {
        let yaml = r#"
server:
  entry: main
plugins:
  - tag: main
    type: frobnicator
"#;
        let config = load_from_str(yaml).unwrap();
        let err = BraidRuntime::from_config(config).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Engine(braid_core::error::Error::TypeNotDefined(_))
        ));
    }

    #[tokio::test]
    async fn test_reverse_lookup_service_survives_runtime_lifecycle() {
        let yaml = r#"
server:
  entry: main
plugins:
  - tag: ptr_cache
    type: reverse_lookup
    args:
      ttl_max: 60
  - tag: main
    type: sequence
    args:
      exec: ["ptr_cache", "_block_with_empty_response"]
"#;
        let config = load_from_str(yaml).unwrap();
        let runtime = BraidRuntime::from_config(config).await.unwrap();

        let mut qctx = qctx_for("example.org.");
        let mut writer = CollectWriter { written: Vec::new() };
        runtime
            .handler()
            .serve(&CancellationToken::new(), &mut qctx, &mut writer)
            .await;
        assert_eq!(writer.written.len(), 1);

        // Purge shuts the reverse-lookup janitor down without panicking.
        runtime.shutdown().await;
        assert!(runtime.registry().is_empty());
    }
}
