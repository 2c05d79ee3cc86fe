//! Mock plugins shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use braid_core::chain::{NodeRef, exec_chain};
use braid_core::context::{ClientMeta, QueryContext, QueryStatus};
use braid_core::error::{Error, Result};
use braid_core::message::{DnsClass, Message, Question, RData, Record, RecordType};
use braid_core::plugin::{Executable, Matcher, Plugin, Service};

/// Creates a fresh A-query context for example.org.
pub fn new_qctx() -> QueryContext {
    QueryContext::new(
        Message::query(Question::new("example.org.", RecordType::A)),
        ClientMeta::default(),
    )
}

/// Builds a reply to `q` carrying `marker` in a TXT answer.
pub fn marked_reply(q: &Message, marker: &str) -> Message {
    Message::reply_to(q).with_answer(Record {
        name: q.question.as_ref().map(|qq| qq.name.clone()).unwrap_or_default(),
        rtype: RecordType::Txt,
        class: DnsClass::In,
        ttl: 0,
        rdata: RData::Txt(marker.to_string()),
    })
}

/// Reads the marker out of a reply built by [`marked_reply`].
pub fn marker_of(m: &Message) -> Option<&str> {
    m.answers.iter().find_map(|r| match &r.rdata {
        RData::Txt(s) => Some(s.as_str()),
        _ => None,
    })
}

enum ExecBehavior {
    Respond { marker: String, delay: Duration },
    Fail,
    Empty,
    PassThrough,
}

/// A scriptable executable plugin.
pub struct ExecPlugin {
    tag: String,
    behavior: ExecBehavior,
    calls: AtomicUsize,
}

impl ExecPlugin {
    /// Short-circuits with a marked response.
    pub fn respond(tag: &str, marker: &str) -> Self {
        Self::respond_after(tag, marker, Duration::ZERO)
    }

    /// Sleeps `delay` (honoring cancellation), then short-circuits with a
    /// marked response.
    pub fn respond_after(tag: &str, marker: &str, delay: Duration) -> Self {
        Self {
            tag: tag.to_string(),
            behavior: ExecBehavior::Respond {
                marker: marker.to_string(),
                delay,
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails.
    pub fn failing(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            behavior: ExecBehavior::Fail,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns success without a response and without calling `next`.
    pub fn empty(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            behavior: ExecBehavior::Empty,
            calls: AtomicUsize::new(0),
        }
    }

    /// Counts the call, then passes through to `next`.
    pub fn noop(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            behavior: ExecBehavior::PassThrough,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times this plugin has executed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executable for ExecPlugin {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ExecBehavior::Respond { marker, delay } => {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(*delay) => {}
                    }
                }
                let reply = marked_reply(qctx.query(), marker);
                qctx.set_response(Some(reply), QueryStatus::Responded);
                Ok(())
            }
            ExecBehavior::Fail => Err(Error::Other(anyhow::anyhow!("scripted failure"))),
            ExecBehavior::Empty => Ok(()),
            ExecBehavior::PassThrough => exec_chain(ctx, qctx, next).await,
        }
    }
}

impl Plugin for ExecPlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        "test_exec"
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

/// A matcher plugin with a fixed verdict (or a scripted error).
pub struct MatchPlugin {
    tag: String,
    verdict: Option<bool>,
    calls: AtomicUsize,
}

impl MatchPlugin {
    /// Always answers `verdict`.
    pub fn new(tag: &str, verdict: bool) -> Self {
        Self {
            tag: tag.to_string(),
            verdict: Some(verdict),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always errors.
    pub fn failing(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            verdict: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times this matcher has been consulted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Matcher for MatchPlugin {
    async fn match_query(&self, _ctx: &CancellationToken, _qctx: &QueryContext) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.verdict {
            Some(v) => Ok(v),
            None => Err(Error::Other(anyhow::anyhow!("scripted matcher failure"))),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Plugin for MatchPlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        "test_matcher"
    }

    fn as_matcher(&self) -> Option<&dyn Matcher> {
        Some(self)
    }
}

/// A service plugin recording whether it was shut down.
pub struct ServicePlugin {
    tag: String,
    shut_down: AtomicBool,
    fail_shutdown: bool,
}

impl ServicePlugin {
    /// A service whose shutdown succeeds.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            shut_down: AtomicBool::new(false),
            fail_shutdown: false,
        }
    }

    /// A service whose shutdown fails.
    pub fn failing(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            shut_down: AtomicBool::new(false),
            fail_shutdown: true,
        }
    }

    /// Whether shutdown has been invoked.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for ServicePlugin {
    async fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        if self.fail_shutdown {
            Err(Error::Other(anyhow::anyhow!("scripted shutdown failure")))
        } else {
            Ok(())
        }
    }
}

impl Plugin for ServicePlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        "test_service"
    }

    fn as_service(&self) -> Option<&dyn Service> {
        Some(self)
    }
}
