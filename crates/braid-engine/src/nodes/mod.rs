//! Control-flow chain nodes.
//!
//! These are the engine's reusable combinators: tag references, if/else
//! branching, speculative parallel races, health-tracked fallback, and
//! round-robin load balancing. The parser builds them from configuration;
//! programmatic callers construct them directly.

pub mod conditional;
pub mod fallback;
pub mod load_balance;
pub mod parallel;

pub use conditional::ConditionalNode;
pub use fallback::FallbackNode;
pub use load_balance::LoadBalanceNode;
pub use parallel::ParallelNode;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use braid_core::chain::{ChainNode, NodeLink, NodeRef};
use braid_core::context::QueryContext;
use braid_core::error::Result;

use crate::registry::Registry;

/// A chain node referencing a registered executable plugin by tag.
///
/// Resolution happens at execution time, so replacing the plugin in the
/// registry takes effect on the next query without re-parsing the chain.
pub struct RefNode {
    registry: Registry,
    tag: String,
    link: NodeLink,
}

impl RefNode {
    /// Creates an unlinked reference to `tag`.
    pub fn new(registry: Registry, tag: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            tag: tag.into(),
            link: NodeLink::new(),
        })
    }

    /// The referenced tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl ChainNode for RefNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        let wrapper = self.registry.get(&self.tag)?;
        wrapper.exec(ctx, qctx, next).await
    }

    fn next_node(&self) -> Option<NodeRef> {
        self.link.get()
    }

    fn set_next(&self, next: Option<NodeRef>) {
        self.link.set(next);
    }
}
