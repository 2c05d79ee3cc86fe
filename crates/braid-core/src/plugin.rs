//! Plugin capability traits.
//!
//! A plugin is a named object registered under a unique tag. What it can
//! *do* is expressed through capability traits:
//!
//! - [`Executable`] — may mutate the query context and/or produce a
//!   response; receives the chain continuation and decides whether to run it.
//! - [`Matcher`] — answers a boolean question about a context.
//! - [`Service`] — owns background resources and must be shut down when the
//!   plugin is displaced or deleted.
//!
//! The [`Plugin`] base trait exposes identity plus capability accessors. The
//! accessors default to `None`; implementations override the ones they
//! satisfy, and the wrapper probes them exactly once at registration time.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Blackhole { tag: String }
//!
//! impl Plugin for Blackhole {
//!     fn tag(&self) -> &str { &self.tag }
//!     fn type_name(&self) -> &str { "blackhole" }
//!     fn as_executable(&self) -> Option<&dyn Executable> { Some(self) }
//! }
//! ```

use std::any::Any;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::chain::NodeRef;
use crate::context::QueryContext;
use crate::error::Result;

/// A unit the chain can execute.
///
/// `next` is the continuation of the enclosing chain. The executable *may*
/// run it (pass-through), skip it (short-circuit), or run it against a
/// copied context (branch isolation). Returning without invoking `next`
/// stops the rest of the chain.
#[async_trait]
pub trait Executable: Send + Sync {
    /// Executes against `qctx` under the cancellation scope `ctx`.
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()>;
}

/// A boolean predicate over a query context.
#[async_trait]
pub trait Matcher: Send + Sync + 'static {
    /// Evaluates the predicate. Errors propagate to the caller with the
    /// offending plugin's tag attached by the wrapper.
    async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool>;

    /// Returns `self` for runtime downcasting.
    ///
    /// Combinators use this to recognize their own wrappers (negation
    /// unwraps double negation through it).
    fn as_any(&self) -> &dyn Any;
}

/// A plugin owning background resources.
#[async_trait]
pub trait Service: Send + Sync {
    /// Releases the service's resources. Called synchronously when the
    /// plugin is displaced from or deleted out of the registry.
    async fn shutdown(&self) -> Result<()>;
}

/// Base trait for registrable plugins.
pub trait Plugin: Send + Sync + 'static {
    /// The unique tag this plugin is registered under.
    fn tag(&self) -> &str;

    /// The plugin type name (the factory key it was built from).
    fn type_name(&self) -> &str;

    /// Returns the executable capability, if this plugin has one.
    fn as_executable(&self) -> Option<&dyn Executable> {
        None
    }

    /// Returns the matcher capability, if this plugin has one.
    fn as_matcher(&self) -> Option<&dyn Matcher> {
        None
    }

    /// Returns the service capability, if this plugin has one.
    fn as_service(&self) -> Option<&dyn Service> {
        None
    }
}
