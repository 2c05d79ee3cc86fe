//! The executable chain abstraction.
//!
//! A chain is a linked list of [`ChainNode`]s built once from configuration.
//! Each node's `exec` receives the continuation (`next`) explicitly and is
//! responsible for invoking it — or deliberately not invoking it. Three
//! idioms compose from this contract:
//!
//! - **Pass-through**: run some logic, then `exec_chain(ctx, qctx, next)`.
//! - **Short-circuit**: return without touching `next`; the rest of the
//!   chain is skipped.
//! - **Substitute context**: run `next` against a deep copy and copy the
//!   interesting state back (parallel and fallback racers do this).
//!
//! Links are written exactly once, at parse time. Composite nodes graft the
//! tails of their sub-branches onto their own successor so a branch that
//! falls through naturally continues with the outer chain; they never
//! re-graft during execution.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::context::QueryContext;
use crate::error::Result;
use crate::plugin::Executable;

/// Shared handle to a chain node.
pub type NodeRef = Arc<dyn ChainNode>;

/// One element of an executable chain.
#[async_trait]
pub trait ChainNode: Send + Sync + 'static {
    /// Executes this node. `next` is the continuation the node may run.
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()>;

    /// Returns this node's successor in the enclosing sequence.
    fn next_node(&self) -> Option<NodeRef>;

    /// Links this node's successor. Called during parsing only.
    fn set_next(&self, next: Option<NodeRef>);
}

/// The set-once successor link embedded in every node.
///
/// Writes happen during parsing, before the chain is shared; the lock only
/// exists so nodes stay `Sync` behind `Arc`.
#[derive(Default)]
pub struct NodeLink {
    next: RwLock<Option<NodeRef>>,
}

impl NodeLink {
    /// Creates an unlinked successor slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot already pointing at `next`.
    pub fn to(next: Option<NodeRef>) -> Self {
        Self {
            next: RwLock::new(next),
        }
    }

    /// Returns the linked successor.
    pub fn get(&self) -> Option<NodeRef> {
        self.next.read().clone()
    }

    /// Writes the successor link.
    pub fn set(&self, next: Option<NodeRef>) {
        *self.next.write() = next;
    }
}

/// Runs `node` with its own successor as the continuation.
///
/// This is the single entry point walkers use; a `None` node is a
/// successful no-op.
pub async fn exec_chain(
    ctx: &CancellationToken,
    qctx: &mut QueryContext,
    node: Option<NodeRef>,
) -> Result<()> {
    match node {
        Some(node) => {
            let next = node.next_node();
            node.exec(ctx, qctx, next).await
        }
        None => Ok(()),
    }
}

/// Returns the last node reachable from `node` by following successors.
///
/// Composite nodes use this at parse time to graft a sub-branch's tail onto
/// their own successor.
pub fn tail(node: &NodeRef) -> NodeRef {
    let mut cur = node.clone();
    while let Some(next) = cur.next_node() {
        cur = next;
    }
    cur
}

/// A chain node wrapping a bare [`Executable`].
///
/// Programmatic builders and tests use this to place an executable into a
/// chain without going through the registry.
pub struct ExecNode {
    exec: Arc<dyn Executable>,
    link: NodeLink,
}

impl ExecNode {
    /// Wraps `exec` into an unlinked node.
    pub fn new(exec: Arc<dyn Executable>) -> Arc<Self> {
        Arc::new(Self {
            exec,
            link: NodeLink::new(),
        })
    }
}

#[async_trait]
impl ChainNode for ExecNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        self.exec.exec(ctx, qctx, next).await
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
    use crate::context::{ClientMeta, QueryContext, QueryStatus};
    use crate::message::{Message, Question, RecordType};

    struct SetMark(u32);

    #[async_trait]
    impl Executable for SetMark {
        async fn exec(
            &self,
            ctx: &CancellationToken,
            qctx: &mut QueryContext,
            next: Option<NodeRef>,
        ) -> Result<()> {
            qctx.add_mark(self.0);
            exec_chain(ctx, qctx, next).await
        }
    }

    struct Stop;

    #[async_trait]
    impl Executable for Stop {
        async fn exec(
            &self,
            _ctx: &CancellationToken,
            qctx: &mut QueryContext,
            _next: Option<NodeRef>,
        ) -> Result<()> {
            let reply = Message::empty_reply(qctx.query());
            qctx.set_response(Some(reply), QueryStatus::Responded);
            Ok(())
        }
    }

    fn new_qctx() -> QueryContext {
        QueryContext::new(
            Message::query(Question::new("example.org.", RecordType::A)),
            ClientMeta::default(),
        )
    }

    fn link(nodes: &[NodeRef]) -> Option<NodeRef> {
        for pair in nodes.windows(2) {
            pair[0].set_next(Some(pair[1].clone()));
        }
        nodes.first().cloned()
    }

    #[tokio::test]
    async fn test_exec_chain_nil_node_is_noop() {
        let ctx = CancellationToken::new();
        let mut qctx = new_qctx();
        exec_chain(&ctx, &mut qctx, None).await.unwrap();
        assert_eq!(qctx.status(), QueryStatus::WaitingResponse);
    }

    #[tokio::test]
    async fn test_pass_through_runs_whole_chain() {
        let nodes: Vec<NodeRef> = vec![
            ExecNode::new(Arc::new(SetMark(1))),
            ExecNode::new(Arc::new(SetMark(2))),
            ExecNode::new(Arc::new(SetMark(3))),
        ];
        let head = link(&nodes);

        let ctx = CancellationToken::new();
        let mut qctx = new_qctx();
        exec_chain(&ctx, &mut qctx, head).await.unwrap();

        assert!(qctx.has_mark(1) && qctx.has_mark(2) && qctx.has_mark(3));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_of_chain() {
        let nodes: Vec<NodeRef> = vec![
            ExecNode::new(Arc::new(SetMark(1))),
            ExecNode::new(Arc::new(Stop)),
            ExecNode::new(Arc::new(SetMark(3))),
        ];
        let head = link(&nodes);

        let ctx = CancellationToken::new();
        let mut qctx = new_qctx();
        exec_chain(&ctx, &mut qctx, head).await.unwrap();

        assert!(qctx.has_mark(1));
        assert!(!qctx.has_mark(3));
        assert_eq!(qctx.status(), QueryStatus::Responded);
    }

    #[test]
    fn test_tail_finds_last_node() {
        let nodes: Vec<NodeRef> = vec![
            ExecNode::new(Arc::new(SetMark(1))),
            ExecNode::new(Arc::new(SetMark(2))),
        ];
        let head = link(&nodes).unwrap();
        assert!(Arc::ptr_eq(&tail(&head), &nodes[1]));
    }
}
