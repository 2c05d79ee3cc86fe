//! Plugin wrapper with cached capability probes.
//!
//! Probing capability accessors on every chain traversal is wasteful. The
//! wrapper records which of {executable, matcher, service} a plugin
//! satisfies once, at wrap time, and answers [`is`](PluginWrapper::is) from
//! those cached flags forever after.
//!
//! The wrapper is also where plugin-internal errors pick up the offending
//! tag: every error leaving [`exec`](PluginWrapper::exec) or
//! [`match_query`](PluginWrapper::match_query) is wrapped with the plugin's
//! tag, except cancellation errors, which propagate verbatim.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use braid_core::chain::NodeRef;
use braid_core::context::QueryContext;
use braid_core::error::{Error, Result};
use braid_core::plugin::Plugin;

/// A plugin capability kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// May execute against a context.
    Executable,
    /// May answer match queries.
    Matcher,
    /// Owns background resources.
    Service,
}

/// A registered plugin plus its cached capability flags.
pub struct PluginWrapper {
    plugin: Arc<dyn Plugin>,
    is_executable: bool,
    is_matcher: bool,
    is_service: bool,
}

impl PluginWrapper {
    /// Wraps `plugin`, probing its capabilities exactly once.
    pub fn wrap(plugin: Arc<dyn Plugin>) -> Arc<Self> {
        let is_executable = plugin.as_executable().is_some();
        let is_matcher = plugin.as_matcher().is_some();
        let is_service = plugin.as_service().is_some();
        Arc::new(Self {
            plugin,
            is_executable,
            is_matcher,
            is_service,
        })
    }

    /// Returns the wrapped plugin's tag.
    pub fn tag(&self) -> &str {
        self.plugin.tag()
    }

    /// Returns the wrapped plugin's type name.
    pub fn type_name(&self) -> &str {
        self.plugin.type_name()
    }

    /// Returns whether the plugin satisfies `capability`.
    pub fn is(&self, capability: Capability) -> bool {
        match capability {
            Capability::Executable => self.is_executable,
            Capability::Matcher => self.is_matcher,
            Capability::Service => self.is_service,
        }
    }

    /// Returns the underlying plugin.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// Executes the plugin with continuation `next`.
    ///
    /// Fails if the plugin is not executable; plugin errors are wrapped
    /// with the tag.
    pub async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        if !self.is_executable {
            return Err(Error::with_tag(
                self.tag(),
                Error::Other(anyhow::anyhow!("plugin is not executable")),
            ));
        }
        // Capability flag is cached from wrap time; the accessor cannot
        // start returning None afterwards.
        let exec = self
            .plugin
            .as_executable()
            .ok_or_else(|| Error::invalid_config(format!("plugin '{}' lost its executable capability", self.tag())))?;
        exec.exec(ctx, qctx, next)
            .await
            .map_err(|e| Error::with_tag(self.tag(), e))
    }

    /// Evaluates the plugin as a matcher.
    ///
    /// Fails if the plugin is not a matcher; matcher errors are wrapped
    /// with the tag.
    pub async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool> {
        if !self.is_matcher {
            return Err(Error::with_tag(
                self.tag(),
                Error::Other(anyhow::anyhow!("plugin is not a matcher")),
            ));
        }
        let matcher = self
            .plugin
            .as_matcher()
            .ok_or_else(|| Error::invalid_config(format!("plugin '{}' lost its matcher capability", self.tag())))?;
        matcher
            .match_query(ctx, qctx)
            .await
            .map_err(|e| Error::with_tag(self.tag(), e))
    }

    /// Shuts the plugin down if it is a service; a no-op otherwise.
    pub async fn shutdown(&self) -> Result<()> {
        match self.plugin.as_service() {
            Some(service) => service.shutdown().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PluginWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginWrapper")
            .field("tag", &self.tag())
            .field("type", &self.type_name())
            .field("executable", &self.is_executable)
            .field("matcher", &self.is_matcher)
            .field("service", &self.is_service)
            .finish()
    }
}
