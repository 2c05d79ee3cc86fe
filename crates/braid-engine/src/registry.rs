//! Plugin registry: tags to live plugins, type names to factories.
//!
//! The registry is the process's source of truth for which plugin answers
//! to which tag. Reads vastly outnumber writes (writes happen at startup
//! and on admin operations), so both maps sit behind a readers-writer lock.
//!
//! Two policies are deliberately strict:
//!
//! - Registering a duplicate *type name* panics at startup. There is one
//!   authoritative factory per type.
//! - When a registered **service** plugin is displaced or deleted, the
//!   registry shuts it down synchronously and panics if shutdown fails —
//!   continuing with a leaked service is strictly worse than crashing.
//!
//! Service shutdown always happens outside the write-locked critical
//! section so a slow shutdown cannot stall query-path lookups.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use braid_core::error::{Error, Result};
use braid_core::plugin::Plugin;

use crate::wrapper::PluginWrapper;

/// Arguments handed to a plugin factory.
pub struct PluginCtor {
    /// The tag the new plugin will be registered under.
    pub tag: String,
    /// Raw args section from configuration; factories weakly decode this
    /// into their own prototype with `serde_json::from_value`.
    pub args: serde_json::Value,
    /// Handle to the registry, for plugins that build sub-chains.
    pub registry: Registry,
}

/// Constructs a plugin from its configuration section.
///
/// Factories may perform I/O (opening stores, spawning janitors), hence the
/// boxed future.
pub type PluginFactory =
    Arc<dyn Fn(PluginCtor) -> BoxFuture<'static, Result<Arc<dyn Plugin>>> + Send + Sync>;

struct RegistryInner {
    plugins: RwLock<HashMap<String, Arc<PluginWrapper>>>,
    factories: RwLock<HashMap<String, PluginFactory>>,
}

/// A cheaply clonable handle to the plugin registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                plugins: RwLock::new(HashMap::new()),
                factories: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registers the factory for plugin type `type_name`.
    ///
    /// # Panics
    ///
    /// Panics if the type already has a factory. Double registration is a
    /// startup-time programming error.
    pub fn register_type(&self, type_name: &str, factory: PluginFactory) {
        let mut factories = self.inner.factories.write();
        if factories.insert(type_name.to_string(), factory).is_some() {
            panic!("plugin type '{type_name}' registered twice");
        }
        debug!(plugin_type = type_name, "Registered plugin type");
    }

    /// Returns whether a factory exists for `type_name`.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.inner.factories.read().contains_key(type_name)
    }

    /// Constructs (but does not register) a plugin from configuration.
    ///
    /// The factory runs outside any registry lock.
    pub async fn new_plugin(
        &self,
        tag: &str,
        type_name: &str,
        args: serde_json::Value,
    ) -> Result<Arc<PluginWrapper>> {
        let factory = self
            .inner
            .factories
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::TypeNotDefined(type_name.to_string()))?;

        let plugin = factory(PluginCtor {
            tag: tag.to_string(),
            args,
            registry: self.clone(),
        })
        .await?;

        debug!(tag, plugin_type = type_name, "Constructed plugin");
        Ok(PluginWrapper::wrap(plugin))
    }

    /// Installs `wrapper` under its tag.
    ///
    /// With `err_if_duplicate`, an occupied tag is an error. Otherwise the
    /// entry is replaced, and a displaced service plugin is shut down
    /// before this call returns.
    ///
    /// # Panics
    ///
    /// Panics if a displaced service fails to shut down.
    pub async fn register(&self, wrapper: Arc<PluginWrapper>, err_if_duplicate: bool) -> Result<()> {
        let tag = wrapper.tag().to_string();
        if tag.is_empty() {
            return Err(Error::invalid_config("plugin tag must not be empty"));
        }

        let displaced = {
            let mut plugins = self.inner.plugins.write();
            if err_if_duplicate && plugins.contains_key(&tag) {
                return Err(Error::invalid_config(format!(
                    "tag '{tag}' is already registered"
                )));
            }
            plugins.insert(tag.clone(), wrapper)
        };

        if let Some(old) = displaced {
            info!(tag, "Replacing registered plugin");
            // Outside the write lock: a slow shutdown must not stall lookups.
            if let Err(e) = old.shutdown().await {
                panic!("shutdown of displaced plugin '{tag}' failed: {e}");
            }
        }
        Ok(())
    }

    /// Looks up the plugin registered under `tag`.
    pub fn get(&self, tag: &str) -> Result<Arc<PluginWrapper>> {
        self.inner
            .plugins
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::TagNotDefined(tag.to_string()))
    }

    /// Removes the plugin registered under `tag`, shutting it down if it
    /// is a service. Removing an absent tag is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the removed service fails to shut down.
    pub async fn delete(&self, tag: &str) {
        let removed = self.inner.plugins.write().remove(tag);
        if let Some(old) = removed {
            info!(tag, "Deleted plugin");
            if let Err(e) = old.shutdown().await {
                panic!("shutdown of deleted plugin '{tag}' failed: {e}");
            }
        }
    }

    /// Removes every plugin and factory. Test helper.
    ///
    /// Services are shut down best-effort; failures are logged, not fatal.
    pub async fn purge(&self) {
        let drained: Vec<(String, Arc<PluginWrapper>)> =
            self.inner.plugins.write().drain().collect();
        self.inner.factories.write().clear();

        for (tag, wrapper) in drained {
            if let Err(e) = wrapper.shutdown().await {
                warn!(tag, error = %e, "Service shutdown failed during purge");
            }
        }
    }

    /// Returns the number of registered plugins.
    pub fn len(&self) -> usize {
        self.inner.plugins.read().len()
    }

    /// Returns whether the registry holds no plugins.
    pub fn is_empty(&self) -> bool {
        self.inner.plugins.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.len())
            .field("types", &self.inner.factories.read().len())
            .finish()
    }
}
