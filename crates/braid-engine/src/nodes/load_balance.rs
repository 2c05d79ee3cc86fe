//! Round-robin load-balance node.
//!
//! Each invocation picks the next branch in turn and runs it in-line: no
//! context copy, no race, no health judgement (health is the fallback
//! node's job). Branches must be semantically equivalent from the caller's
//! perspective.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use braid_core::chain::{ChainNode, NodeLink, NodeRef, exec_chain};
use braid_core::context::QueryContext;
use braid_core::error::{Error, Result};

/// Round-robin dispatcher over N equivalent subchains.
pub struct LoadBalanceNode {
    branches: Vec<NodeRef>,
    cursor: AtomicUsize,
    link: NodeLink,
}

impl LoadBalanceNode {
    /// Creates an unlinked load-balance node.
    pub fn new(branches: Vec<NodeRef>) -> Arc<Self> {
        Arc::new(Self {
            branches,
            cursor: AtomicUsize::new(0),
            link: NodeLink::new(),
        })
    }
}

#[async_trait]
impl ChainNode for LoadBalanceNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        if self.branches.is_empty() {
            return exec_chain(ctx, qctx, next).await;
        }

        let turn = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let index = turn % self.branches.len();
        trace!(query = qctx.id(), index, "Load balance picked branch");

        // Branch tails are grafted onto this node's successor at parse
        // time; a branch that falls through continues the outer chain.
        exec_chain(ctx, qctx, Some(self.branches[index].clone()))
            .await
            .map_err(|e| Error::with_tag(format!("load_balance branch {index}"), e))
    }

    fn next_node(&self) -> Option<NodeRef> {
        self.link.get()
    }

    fn set_next(&self, next: Option<NodeRef>) {
        self.link.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ExecPlugin, marker_of, new_qctx};
    use braid_core::chain::ExecNode;

    #[tokio::test]
    async fn test_round_robin_order() {
        let branches: Vec<NodeRef> = (1..=3)
            .map(|n| {
                ExecNode::new(Arc::new(ExecPlugin::respond(
                    &format!("b{n}"),
                    &format!("m{n}"),
                ))) as NodeRef
            })
            .collect();
        let node = LoadBalanceNode::new(branches);
        let ctx = CancellationToken::new();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let mut qctx = new_qctx();
            exec_chain(&ctx, &mut qctx, Some(node.clone() as NodeRef))
                .await
                .unwrap();
            seen.push(marker_of(qctx.response().unwrap()).unwrap().to_string());
        }
        assert_eq!(seen, vec!["m2", "m3", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_branch_error_carries_index() {
        let node = LoadBalanceNode::new(vec![
            ExecNode::new(Arc::new(ExecPlugin::failing("bad"))) as NodeRef,
        ]);
        let mut qctx = new_qctx();
        let err = exec_chain(&CancellationToken::new(), &mut qctx, Some(node as NodeRef))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("load_balance branch 0"));
    }

    #[tokio::test]
    async fn test_even_distribution() {
        let plugins: Vec<Arc<ExecPlugin>> = (0..3)
            .map(|n| Arc::new(ExecPlugin::respond(&format!("b{n}"), "m")))
            .collect();
        let branches: Vec<NodeRef> = plugins
            .iter()
            .map(|p| ExecNode::new(p.clone() as Arc<dyn braid_core::plugin::Executable>) as NodeRef)
            .collect();
        let node = LoadBalanceNode::new(branches);
        let ctx = CancellationToken::new();

        for _ in 0..9 {
            let mut qctx = new_qctx();
            exec_chain(&ctx, &mut qctx, Some(node.clone() as NodeRef))
                .await
                .unwrap();
        }
        for p in &plugins {
            assert_eq!(p.calls(), 3);
        }
    }
}
