//! Reverse-lookup observer with PTR synthesis.
//!
//! A pass-through observer that runs `next` and then records every A/AAAA
//! answer into a TTL-bounded store. PTR queries whose reverse-zone name
//! matches a stored address are answered from the store directly, without
//! ever reaching `next`.
//!
//! The plugin is also a [`Service`]: it owns a janitor task sweeping
//! expired entries, shut down when the plugin leaves the registry.
//!
//! ```yaml
//! plugins:
//!   - tag: ptr_cache
//!     type: reverse_lookup
//!     args:
//!       ttl_max: 3600
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use braid_core::chain::{NodeRef, exec_chain};
use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::Result;
use braid_core::message::{Message, Record, RecordType, ip_from_reverse_name};
use braid_core::plugin::{Executable, Plugin, Service};

use crate::registry::PluginFactory;

/// Type name of the reverse-lookup plugin.
pub const TYPE_REVERSE_LOOKUP: &str = "reverse_lookup";

/// Arguments of the reverse-lookup plugin.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReverseLookupArgs {
    /// Cap on how long an address-to-name mapping is kept, in seconds.
    pub ttl_max: u32,
    /// Answer PTR queries from the store, short-circuiting the chain.
    pub handle_ptr: bool,
    /// Janitor sweep interval, in seconds.
    pub sweep_interval: u64,
}

impl Default for ReverseLookupArgs {
    fn default() -> Self {
        Self {
            ttl_max: 7200,
            handle_ptr: true,
            sweep_interval: 60,
        }
    }
}

struct PtrEntry {
    name: String,
    expires_at: Instant,
}

/// Address-to-name store with per-entry expiry.
struct PtrStore {
    entries: RwLock<HashMap<IpAddr, PtrEntry>>,
}

impl PtrStore {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, ip: IpAddr, name: String, ttl: u32) {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(ttl));
        self.entries.write().insert(ip, PtrEntry { name, expires_at });
    }

    /// Returns the stored name and its remaining lifetime in seconds.
    fn lookup(&self, ip: IpAddr) -> Option<(String, u32)> {
        let entries = self.entries.read();
        let entry = entries.get(&ip)?;
        let remaining = entry.expires_at.checked_duration_since(Instant::now())?;
        Some((entry.name.clone(), remaining.as_secs() as u32))
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Observer recording forward answers and synthesizing PTR replies.
pub struct ReverseLookupPlugin {
    tag: String,
    args: ReverseLookupArgs,
    store: Arc<PtrStore>,
    janitor_token: CancellationToken,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl ReverseLookupPlugin {
    /// Creates the plugin and starts its janitor task.
    pub fn start(tag: impl Into<String>, args: ReverseLookupArgs) -> Self {
        let store = Arc::new(PtrStore::new());
        let janitor_token = CancellationToken::new();

        let sweep_store = store.clone();
        let sweep_token = janitor_token.clone();
        let interval = Duration::from_secs(args.sweep_interval.max(1));
        let janitor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sweep_token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {
                        let removed = sweep_store.sweep();
                        if removed > 0 {
                            trace!(removed, "Swept expired reverse-lookup entries");
                        }
                    }
                }
            }
        });

        Self {
            tag: tag.into(),
            args,
            store,
            janitor_token,
            janitor: Mutex::new(Some(janitor)),
        }
    }

    /// Number of live store entries.
    pub fn store_len(&self) -> usize {
        self.store.len()
    }

    fn try_answer_ptr(&self, qctx: &QueryContext) -> Option<Message> {
        let question = qctx.query().question.as_ref()?;
        if question.qtype != RecordType::Ptr {
            return None;
        }
        let ip = ip_from_reverse_name(&question.name)?;
        let (name, ttl) = self.store.lookup(ip)?;

        let reply = Message::reply_to(qctx.query())
            .with_answer(Record::ptr(question.name.clone(), ttl, name));
        Some(reply)
    }

    fn record_answers(&self, qctx: &QueryContext) {
        let Some(response) = qctx.response() else {
            return;
        };
        for record in &response.answers {
            if let Some(ip) = record.ip() {
                let ttl = record.ttl.min(self.args.ttl_max);
                debug!(%ip, name = %record.name, ttl, "Recorded reverse mapping");
                self.store.insert(ip, record.name.clone(), ttl);
            }
        }
    }
}

#[async_trait]
impl Executable for ReverseLookupPlugin {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        if self.args.handle_ptr
            && let Some(reply) = self.try_answer_ptr(qctx)
        {
            qctx.set_response(Some(reply), QueryStatus::Responded);
            return Ok(());
        }

        exec_chain(ctx, qctx, next).await?;
        self.record_answers(qctx);
        Ok(())
    }
}

#[async_trait]
impl Service for ReverseLookupPlugin {
    async fn shutdown(&self) -> Result<()> {
        self.janitor_token.cancel();
        let handle = self.janitor.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| anyhow::anyhow!("reverse-lookup janitor panicked: {e}"))?;
        }
        Ok(())
    }
}

impl Plugin for ReverseLookupPlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        TYPE_REVERSE_LOOKUP
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }

    fn as_service(&self) -> Option<&dyn Service> {
        Some(self)
    }
}

/// Factory for [`register_type`](crate::registry::Registry::register_type).
pub fn factory() -> PluginFactory {
    Arc::new(|ctor| {
        Box::pin(async move {
            let args: ReverseLookupArgs = if ctor.args.is_null() {
                ReverseLookupArgs::default()
            } else {
                serde_json::from_value(ctor.args).map_err(|e| {
                    braid_core::error::Error::invalid_config(format!("reverse_lookup args: {e}"))
                })?
            };
            Ok(Arc::new(ReverseLookupPlugin::start(ctor.tag, args)) as Arc<dyn Plugin>)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ExecPlugin, new_qctx};
    use braid_core::chain::ExecNode;
    use braid_core::context::ClientMeta;
    use braid_core::message::{Question, RData, reverse_name};
    use std::net::Ipv4Addr;

    struct RespondWithA;

    #[async_trait]
    impl Executable for RespondWithA {
        async fn exec(
            &self,
            _ctx: &CancellationToken,
            qctx: &mut QueryContext,
            _next: Option<NodeRef>,
        ) -> Result<()> {
            let reply = Message::reply_to(qctx.query()).with_answer(Record::a(
                "example.org.",
                300,
                Ipv4Addr::new(192, 0, 2, 1),
            ));
            qctx.set_response(Some(reply), QueryStatus::Responded);
            Ok(())
        }
    }

    fn ptr_qctx(ip: IpAddr) -> QueryContext {
        QueryContext::new(
            Message::query(Question::new(reverse_name(ip), RecordType::Ptr)),
            ClientMeta::default(),
        )
    }

    #[tokio::test]
    async fn test_observes_answers_and_synthesizes_ptr() {
        let plugin = ReverseLookupPlugin::start("rl", ReverseLookupArgs::default());
        let ctx = CancellationToken::new();

        // Forward query passes through and is recorded.
        let mut qctx = new_qctx();
        let next: NodeRef = ExecNode::new(Arc::new(RespondWithA));
        plugin.exec(&ctx, &mut qctx, Some(next)).await.unwrap();
        assert_eq!(plugin.store_len(), 1);

        // The matching PTR query is answered from the store.
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let mut qctx = ptr_qctx(ip);
        let unused = Arc::new(ExecPlugin::respond("unused", "x"));
        let next: NodeRef = ExecNode::new(unused.clone());
        plugin.exec(&ctx, &mut qctx, Some(next)).await.unwrap();

        assert_eq!(unused.calls(), 0);
        let answers = &qctx.response().unwrap().answers;
        assert_eq!(answers.len(), 1);
        assert!(matches!(&answers[0].rdata, RData::Ptr(name) if name == "example.org."));

        plugin.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_ptr_falls_through() {
        let plugin = ReverseLookupPlugin::start("rl", ReverseLookupArgs::default());
        let ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9));

        let mut qctx = ptr_qctx(ip);
        let downstream = Arc::new(ExecPlugin::respond("down", "r"));
        let next: NodeRef = ExecNode::new(downstream.clone());
        plugin
            .exec(&CancellationToken::new(), &mut qctx, Some(next))
            .await
            .unwrap();

        assert_eq!(downstream.calls(), 1);
        plugin.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_is_capped() {
        let plugin = ReverseLookupPlugin::start(
            "rl",
            ReverseLookupArgs {
                ttl_max: 10,
                ..Default::default()
            },
        );
        let ctx = CancellationToken::new();

        let mut qctx = new_qctx();
        let next: NodeRef = ExecNode::new(Arc::new(RespondWithA));
        plugin.exec(&ctx, &mut qctx, Some(next)).await.unwrap();

        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let (_, ttl) = plugin.store.lookup(ip).unwrap();
        assert!(ttl <= 10);

        plugin.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_janitor() {
        let plugin = ReverseLookupPlugin::start("rl", ReverseLookupArgs::default());
        plugin.shutdown().await.unwrap();
        assert!(plugin.janitor.lock().is_none());
    }
}
