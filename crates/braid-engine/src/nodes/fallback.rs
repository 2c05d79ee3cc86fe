//! Primary/secondary fallback node with health tracking.
//!
//! Two distinct modes, selected by configuration:
//!
//! **Stat-based** (no `fast_fallback`): a sliding window of recent primary
//! attempts decides the shape of each query. While the window is good the
//! primary runs alone on an isolated copy; once it accumulates enough
//! failures, primary and secondary race and the first valid response wins.
//! Every primary attempt updates the window, whichever limb wins.
//!
//! **Fast** (`fast_fallback` > 0): the primary starts immediately. With
//! `always_standby` off, the secondary starts only once the primary has
//! failed or the timer has elapsed, keeping load off the secondary. With
//! `always_standby` on, the secondary starts immediately but its result is
//! only *delivered* after primary failure or the timer — it stays warm
//! without being preferred.
//!
//! Both modes isolate limbs on context copies; a losing limb cannot corrupt
//! the caller's state. An attempt counts as failed when it errors or ends
//! without a response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use braid_core::chain::{ChainNode, NodeLink, NodeRef, exec_chain};
use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::{Error, Result};

use crate::tracker::StatusTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limb {
    Primary,
    Secondary,
}

/// Primary/secondary fallback combinator.
pub struct FallbackNode {
    primary: Option<NodeRef>,
    secondary: Option<NodeRef>,
    tracker: Option<Arc<StatusTracker>>,
    fast_fallback: Option<Duration>,
    always_standby: bool,
    link: NodeLink,
}

impl FallbackNode {
    /// Creates an unlinked fallback node.
    ///
    /// Without a tracker, stat-based mode degrades to always trusting the
    /// primary; without `fast_fallback`, the timer path is disabled.
    pub fn new(
        primary: Option<NodeRef>,
        secondary: Option<NodeRef>,
        tracker: Option<Arc<StatusTracker>>,
        fast_fallback: Option<Duration>,
        always_standby: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            primary,
            secondary,
            tracker,
            fast_fallback,
            always_standby,
            link: NodeLink::new(),
        })
    }

    async fn exec_stat(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        primary: NodeRef,
        secondary: NodeRef,
    ) -> Result<()> {
        let good = self.tracker.as_ref().is_none_or(|t| t.good());
        if good {
            let mut copy = qctx.copy();
            let res = exec_chain(ctx, &mut copy, Some(primary)).await;
            let failed = res.is_err() || copy.response().is_none();
            if let Some(t) = &self.tracker {
                t.update(failed);
            }
            res?;
            copy.copy_to(qctx);
            return Ok(());
        }

        debug!(query = qctx.id(), "Primary window is bad, racing limbs");
        self.race(ctx, qctx, primary, secondary).await
    }

    async fn race(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        primary: NodeRef,
        secondary: NodeRef,
    ) -> Result<()> {
        let child = ctx.child_token();
        let (tx, mut rx) = mpsc::channel(2);
        tokio::spawn(run_limb(
            Limb::Primary,
            child.clone(),
            qctx.copy(),
            primary,
            self.tracker.clone(),
            tx.clone(),
        ));
        tokio::spawn(run_limb(
            Limb::Secondary,
            child.clone(),
            qctx.copy(),
            secondary,
            None,
            tx.clone(),
        ));
        drop(tx);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    child.cancel();
                    return Err(Error::Cancelled);
                }
                recv = rx.recv() => {
                    let Some((limb, res, limb_ctx)) = recv else { break };
                    match res {
                        Ok(()) if limb_ctx.response().is_some() => {
                            child.cancel();
                            limb_ctx.copy_to(qctx);
                            return Ok(());
                        }
                        Ok(()) => debug!(query = qctx.id(), ?limb, "Fallback limb finished empty"),
                        Err(e) => warn!(query = qctx.id(), ?limb, error = %e, "Fallback limb failed"),
                    }
                }
            }
        }

        child.cancel();
        qctx.set_response(None, QueryStatus::ServerFailed);
        Err(Error::NoResponse)
    }

    async fn exec_fast(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        primary: NodeRef,
        secondary: NodeRef,
        delay: Duration,
    ) -> Result<()> {
        let child = ctx.child_token();
        let (tx, mut rx) = mpsc::channel(2);
        tokio::spawn(run_limb(
            Limb::Primary,
            child.clone(),
            qctx.copy(),
            primary,
            self.tracker.clone(),
            tx.clone(),
        ));

        let mut secondary_started = self.always_standby;
        if secondary_started {
            tokio::spawn(run_limb(
                Limb::Secondary,
                child.clone(),
                qctx.copy(),
                secondary.clone(),
                None,
                tx.clone(),
            ));
        }

        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        let mut timer_done = false;
        // Secondary results are only delivered after primary failure or the
        // fast-fallback timer; until then a standby result is buffered.
        let mut deliver_secondary = false;
        let mut standby: Option<(Result<()>, QueryContext)> = None;
        let mut primary_bad = false;
        let mut secondary_bad = false;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    child.cancel();
                    return Err(Error::Cancelled);
                }
                _ = &mut timer, if !timer_done => {
                    timer_done = true;
                    deliver_secondary = true;
                    if !secondary_started {
                        secondary_started = true;
                        debug!(query = qctx.id(), "Fast-fallback timer fired, starting secondary");
                        tokio::spawn(run_limb(
                            Limb::Secondary,
                            child.clone(),
                            qctx.copy(),
                            secondary.clone(),
                            None,
                            tx.clone(),
                        ));
                    }
                }
                recv = rx.recv() => {
                    let Some((limb, res, limb_ctx)) = recv else { break };
                    match limb {
                        Limb::Primary => {
                            if res.is_ok() && limb_ctx.response().is_some() {
                                child.cancel();
                                limb_ctx.copy_to(qctx);
                                return Ok(());
                            }
                            if let Err(e) = res {
                                warn!(query = qctx.id(), error = %e, "Fallback primary failed");
                            }
                            primary_bad = true;
                            deliver_secondary = true;
                            if !secondary_started {
                                secondary_started = true;
                                tokio::spawn(run_limb(
                                    Limb::Secondary,
                                    child.clone(),
                                    qctx.copy(),
                                    secondary.clone(),
                                    None,
                                    tx.clone(),
                                ));
                            }
                        }
                        Limb::Secondary => {
                            if deliver_secondary {
                                if res.is_ok() && limb_ctx.response().is_some() {
                                    child.cancel();
                                    limb_ctx.copy_to(qctx);
                                    return Ok(());
                                }
                                if let Err(e) = res {
                                    warn!(query = qctx.id(), error = %e, "Fallback secondary failed");
                                }
                                secondary_bad = true;
                            } else {
                                standby = Some((res, limb_ctx));
                            }
                        }
                    }
                }
            }

            if deliver_secondary
                && let Some((res, limb_ctx)) = standby.take()
            {
                if res.is_ok() && limb_ctx.response().is_some() {
                    child.cancel();
                    limb_ctx.copy_to(qctx);
                    return Ok(());
                }
                secondary_bad = true;
            }
            if primary_bad && secondary_bad {
                break;
            }
        }

        child.cancel();
        qctx.set_response(None, QueryStatus::ServerFailed);
        Err(Error::NoResponse)
    }
}

async fn run_limb(
    limb: Limb,
    token: CancellationToken,
    mut qctx: QueryContext,
    node: NodeRef,
    tracker: Option<Arc<StatusTracker>>,
    tx: mpsc::Sender<(Limb, Result<()>, QueryContext)>,
) {
    let res = tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        r = exec_chain(&token, &mut qctx, Some(node)) => r,
    };
    if limb == Limb::Primary
        && let Some(t) = &tracker
    {
        t.update(res.is_err() || qctx.response().is_none());
    }
    let _ = tx.send((limb, res, qctx)).await;
}

#[async_trait]
impl ChainNode for FallbackNode {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        match (self.primary.clone(), self.secondary.clone()) {
            (None, None) => exec_chain(ctx, qctx, next).await,
            (Some(p), None) => exec_chain(ctx, qctx, Some(p)).await,
            (None, Some(s)) => exec_chain(ctx, qctx, Some(s)).await,
            (Some(p), Some(s)) => match self.fast_fallback {
                Some(delay) => self.exec_fast(ctx, qctx, p, s, delay).await,
                None => self.exec_stat(ctx, qctx, p, s).await,
            },
        }
    }

    fn next_node(&self) -> Option<NodeRef> {
        self.link.get()
    }

    fn set_next(&self, next: Option<NodeRef>) {
        self.link.set(next);
    }
}
