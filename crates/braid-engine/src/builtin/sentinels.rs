//! Sentinel plugins preregistered under reserved tags.
//!
//! Reserved tags start with `_` and are installed before user plugins:
//!
//! | Tag | Effect |
//! |---|---|
//! | `_drop_response` | status Dropped, nothing written |
//! | `_block_with_empty_response` | empty NOERROR reply, Rejected |
//! | `_block_with_servfail` | SERVFAIL reply, Rejected |
//! | `_block_with_nxdomain` | NXDOMAIN reply, Rejected |
//! | `_prefer_ipv4` | run `next`, strip AAAA when A answers exist |
//! | `_prefer_ipv6` | run `next`, strip A when AAAA answers exist |
//! | `_single_flight` | coalesce concurrent identical questions |
//!
//! The blockers and `_drop_response` short-circuit; the preferers and
//! `_single_flight` are pass-through observers around `next`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use braid_core::chain::{NodeRef, exec_chain};
use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::{Error, Result};
use braid_core::message::{Message, RData};
use braid_core::plugin::{Executable, Plugin};

use crate::registry::Registry;
use crate::wrapper::PluginWrapper;

/// Reserved tag: drop the query silently.
pub const TAG_DROP_RESPONSE: &str = "_drop_response";
/// Reserved tag: answer with an empty NOERROR reply.
pub const TAG_BLOCK_WITH_EMPTY_RESPONSE: &str = "_block_with_empty_response";
/// Reserved tag: answer with SERVFAIL.
pub const TAG_BLOCK_WITH_SERVFAIL: &str = "_block_with_servfail";
/// Reserved tag: answer with NXDOMAIN.
pub const TAG_BLOCK_WITH_NXDOMAIN: &str = "_block_with_nxdomain";
/// Reserved tag: prefer IPv4 answers.
pub const TAG_PREFER_IPV4: &str = "_prefer_ipv4";
/// Reserved tag: prefer IPv6 answers.
pub const TAG_PREFER_IPV6: &str = "_prefer_ipv6";
/// Reserved tag: coalesce concurrent identical questions.
pub const TAG_SINGLE_FLIGHT: &str = "_single_flight";

#[derive(Debug, Clone, Copy)]
enum SentinelAction {
    Drop,
    BlockEmpty,
    BlockServfail,
    BlockNxdomain,
    PreferV4,
    PreferV6,
}

struct SentinelPlugin {
    tag: &'static str,
    type_name: &'static str,
    action: SentinelAction,
}

impl SentinelPlugin {
    fn new(tag: &'static str, type_name: &'static str, action: SentinelAction) -> Arc<Self> {
        Arc::new(Self {
            tag,
            type_name,
            action,
        })
    }
}

/// Removes the dispreferred address family, but only when at least one
/// answer of the preferred family is present.
fn strip_family(response: &mut Message, keep_v4: bool) {
    let has_preferred = response.answers.iter().any(|r| match r.rdata {
        RData::A(_) => keep_v4,
        RData::Aaaa(_) => !keep_v4,
        _ => false,
    });
    if has_preferred {
        response.answers.retain(|r| match r.rdata {
            RData::A(_) => keep_v4,
            RData::Aaaa(_) => !keep_v4,
            _ => true,
        });
    }
}

#[async_trait]
impl Executable for SentinelPlugin {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        match self.action {
            SentinelAction::Drop => {
                qctx.set_response(None, QueryStatus::Dropped);
                Ok(())
            }
            SentinelAction::BlockEmpty => {
                let reply = Message::empty_reply(qctx.query());
                qctx.set_response(Some(reply), QueryStatus::Rejected);
                Ok(())
            }
            SentinelAction::BlockServfail => {
                let reply = Message::servfail_reply(qctx.query());
                qctx.set_response(Some(reply), QueryStatus::Rejected);
                Ok(())
            }
            SentinelAction::BlockNxdomain => {
                let reply = Message::nxdomain_reply(qctx.query());
                qctx.set_response(Some(reply), QueryStatus::Rejected);
                Ok(())
            }
            SentinelAction::PreferV4 => {
                exec_chain(ctx, qctx, next).await?;
                if let Some(response) = qctx.response_mut() {
                    strip_family(response, true);
                }
                Ok(())
            }
            SentinelAction::PreferV6 => {
                exec_chain(ctx, qctx, next).await?;
                if let Some(response) = qctx.response_mut() {
                    strip_family(response, false);
                }
                Ok(())
            }
        }
    }
}

impl Plugin for SentinelPlugin {
    fn tag(&self) -> &str {
        self.tag
    }

    fn type_name(&self) -> &str {
        self.type_name
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

// ─── single flight ───────────────────────────────────────────────────────────

#[derive(Clone)]
struct FlightOutcome {
    response: Option<Message>,
    status: QueryStatus,
}

/// Coalesces concurrent executions of `next` for the same question.
///
/// The first query for a question key becomes the leader and runs `next`;
/// followers arriving while the leader is in flight wait and adopt a copy
/// of the leader's terminal state with their own transaction id restored.
/// If the leader fails, followers fall back to running `next` themselves.
pub struct SingleFlightPlugin {
    tag: String,
    inflight: Mutex<HashMap<String, watch::Receiver<Option<FlightOutcome>>>>,
}

impl SingleFlightPlugin {
    /// Creates the plugin under `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Executable for SingleFlightPlugin {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        let Some(key) = qctx.query().question.as_ref().map(|q| q.key()) else {
            return exec_chain(ctx, qctx, next).await;
        };

        enum Role {
            Leader(watch::Sender<Option<FlightOutcome>>),
            Follower(watch::Receiver<Option<FlightOutcome>>),
        }

        let role = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                let res = exec_chain(ctx, qctx, next).await;
                if res.is_ok() {
                    let _ = tx.send(Some(FlightOutcome {
                        response: qctx.response().cloned(),
                        status: qctx.status(),
                    }));
                }
                self.inflight.lock().await.remove(&key);
                res
            }
            Role::Follower(mut rx) => {
                debug!(query = qctx.id(), key = %key, "Joining in-flight query");
                loop {
                    let outcome = rx.borrow_and_update().clone();
                    if let Some(outcome) = outcome {
                        let mut response = outcome.response;
                        if let Some(r) = &mut response {
                            r.header.id = qctx.query().header.id;
                        }
                        qctx.set_response(response, outcome.status);
                        return Ok(());
                    }

                    tokio::select! {
                        _ = ctx.cancelled() => return Err(Error::Cancelled),
                        changed = rx.changed() => {
                            if changed.is_err() {
                                // Leader died without publishing; resolve alone.
                                return exec_chain(ctx, qctx, next).await;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Plugin for SingleFlightPlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        "single_flight"
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

/// Installs every sentinel plugin under its reserved tag.
pub async fn register_sentinels(registry: &Registry) -> Result<()> {
    let sentinels: Vec<Arc<dyn Plugin>> = vec![
        SentinelPlugin::new(TAG_DROP_RESPONSE, "drop_response", SentinelAction::Drop),
        SentinelPlugin::new(
            TAG_BLOCK_WITH_EMPTY_RESPONSE,
            "block_with_empty_response",
            SentinelAction::BlockEmpty,
        ),
        SentinelPlugin::new(
            TAG_BLOCK_WITH_SERVFAIL,
            "block_with_servfail",
            SentinelAction::BlockServfail,
        ),
        SentinelPlugin::new(
            TAG_BLOCK_WITH_NXDOMAIN,
            "block_with_nxdomain",
            SentinelAction::BlockNxdomain,
        ),
        SentinelPlugin::new(TAG_PREFER_IPV4, "prefer_ipv4", SentinelAction::PreferV4),
        SentinelPlugin::new(TAG_PREFER_IPV6, "prefer_ipv6", SentinelAction::PreferV6),
        Arc::new(SingleFlightPlugin::new(TAG_SINGLE_FLIGHT)),
    ];

    for plugin in sentinels {
        registry.register(PluginWrapper::wrap(plugin), true).await?;
    }
    Ok(())
}
