//! Speculative parallel race node.
//!
//! All branches run concurrently, each against its own deep copy of the
//! query context, under a cancellation scope derived from the caller's.
//! The first branch to produce a non-nil response without an error wins;
//! its query, response, status, and marks replace the caller's state, and
//! the siblings are cancelled. Later responses are discarded even if they
//! would have been "better" — no merging occurs.
//!
//! Cancellation is cooperative: a branch that never checks the token runs
//! to completion and its result is simply dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use braid_core::chain::{ChainNode, NodeLink, NodeRef, exec_chain};
use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::{Error, Result};

/// Upper bound applied when configuration names no timeout.
pub const DEFAULT_PARALLEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Races N subchains on isolated context copies.
pub struct ParallelNode {
    branches: Vec<NodeRef>,
    timeout: Duration,
    link: NodeLink,
}

impl ParallelNode {
    /// Creates an unlinked parallel node. `timeout` bounds each branch;
    /// `None` applies [`DEFAULT_PARALLEL_TIMEOUT`].
    pub fn new(branches: Vec<NodeRef>, timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            branches,
            timeout: timeout.unwrap_or(DEFAULT_PARALLEL_TIMEOUT),
            link: NodeLink::new(),
        })
    }
}

async fn run_branch(
    token: CancellationToken,
    mut qctx: QueryContext,
    branch: NodeRef,
    timeout: Duration,
    tx: mpsc::Sender<(Result<()>, QueryContext)>,
) {
    let res = tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        r = tokio::time::timeout(timeout, exec_chain(&token, &mut qctx, Some(branch))) => {
            match r {
                Ok(inner) => inner,
                Err(_) => Err(Error::DeadlineExceeded),
            }
        }
    };
    let _ = tx.send((res, qctx)).await;
}

#[async_trait]
impl ChainNode for ParallelNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        if self.branches.is_empty() {
            return exec_chain(ctx, qctx, next).await;
        }

        let child = ctx.child_token();
        let (tx, mut rx) = mpsc::channel(self.branches.len());
        for branch in &self.branches {
            tokio::spawn(run_branch(
                child.clone(),
                qctx.copy(),
                branch.clone(),
                self.timeout,
                tx.clone(),
            ));
        }
        drop(tx);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    child.cancel();
                    return Err(Error::Cancelled);
                }
                recv = rx.recv() => {
                    let Some((res, branch_ctx)) = recv else { break };
                    match res {
                        Ok(()) if branch_ctx.response().is_some() => {
                            child.cancel();
                            branch_ctx.copy_to(qctx);
                            return Ok(());
                        }
                        Ok(()) => {
                            debug!(query = qctx.id(), "Parallel branch finished empty");
                        }
                        Err(e) => {
                            warn!(query = qctx.id(), error = %e, "Parallel branch failed");
                        }
                    }
                }
            }
        }

        child.cancel();
        qctx.set_response(None, QueryStatus::ServerFailed);
        Err(Error::NoResponse)
    }

    fn next_node(&self) -> Option<NodeRef> {
        self.link.get()
    }

    fn set_next(&self, next: Option<NodeRef>) {
        self.link.set(next);
    }
}
