//! If/else chain node.
//!
//! The condition is a single matcher, typically a [`BatchMatchOr`] over an
//! `if` list or a [`BatchMatchAnd`] over an `if_and` list. When both keys
//! appear in configuration, `if` takes priority and `if_and` is ignored;
//! they are never silently combined. The parser is the one place that
//! enforces this.
//!
//! Branch tails are grafted onto the node's own successor at parse time, so
//! a branch that completes without short-circuiting continues with the
//! outer chain on its own. The node only invokes `next` itself when no
//! branch applies.
//!
//! [`BatchMatchOr`]: crate::matcher::BatchMatchOr
//! [`BatchMatchAnd`]: crate::matcher::BatchMatchAnd

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use braid_core::chain::{ChainNode, NodeLink, NodeRef, exec_chain};
use braid_core::context::QueryContext;
use braid_core::error::Result;
use braid_core::plugin::Matcher;

/// Conditional branch node.
pub struct ConditionalNode {
    condition: Arc<dyn Matcher>,
    then_branch: Option<NodeRef>,
    else_branch: Option<NodeRef>,
    link: NodeLink,
}

impl ConditionalNode {
    /// Creates an unlinked conditional node.
    pub fn new(
        condition: Arc<dyn Matcher>,
        then_branch: Option<NodeRef>,
        else_branch: Option<NodeRef>,
    ) -> Arc<Self> {
        Arc::new(Self {
            condition,
            then_branch,
            else_branch,
            link: NodeLink::new(),
        })
    }
}

#[async_trait]
impl ChainNode for ConditionalNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        let matched = self.condition.match_query(ctx, qctx).await?;
        trace!(query = qctx.id(), matched, "Conditional evaluated");

        let branch = if matched {
            self.then_branch.clone()
        } else {
            self.else_branch.clone()
        };

        match branch {
            Some(branch) => exec_chain(ctx, qctx, Some(branch)).await,
            None => exec_chain(ctx, qctx, next).await,
        }
    }

    fn next_node(&self) -> Option<NodeRef> {
        self.link.get()
    }

    fn set_next(&self, next: Option<NodeRef>) {
        self.link.set(next);
    }
}
