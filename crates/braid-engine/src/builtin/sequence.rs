//! The `sequence` plugin type.
//!
//! A sequence is an executable plugin whose args hold a chain:
//!
//! ```yaml
//! plugins:
//!   - tag: main
//!     type: sequence
//!     args:
//!       exec:
//!         - { if: ["private_net"], exec: [local_forward] }
//!         - upstream_forward
//! ```
//!
//! This is how configuration names a chain; the server handler's entry tag
//! usually points at a sequence. A sequence invoked mid-chain continues
//! with its caller's continuation only while the query is still unresolved,
//! so a response produced inside the sequence short-circuits the outside
//! exactly like a response produced by a plain executable.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use braid_core::chain::{NodeRef, exec_chain};
use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::Result;
use braid_core::plugin::{Executable, Plugin};

use crate::parser::parse_chain;
use crate::registry::{PluginFactory, Registry};

/// Type name of the sequence plugin.
pub const TYPE_SEQUENCE: &str = "sequence";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SequenceArgs {
    exec: Vec<Value>,
}

/// An executable plugin wrapping a parsed chain.
pub struct SequencePlugin {
    tag: String,
    chain: Option<NodeRef>,
}

impl SequencePlugin {
    /// Parses `entries` into a chain owned by this plugin.
    pub fn new(registry: &Registry, tag: impl Into<String>, entries: &[Value]) -> Result<Self> {
        Ok(Self {
            tag: tag.into(),
            chain: parse_chain(registry, entries)?,
        })
    }
}

#[async_trait]
impl Executable for SequencePlugin {
    async fn exec(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        next: Option<NodeRef>,
    ) -> Result<()> {
        exec_chain(ctx, qctx, self.chain.clone()).await?;
        if qctx.status() == QueryStatus::WaitingResponse {
            exec_chain(ctx, qctx, next).await
        } else {
            Ok(())
        }
    }
}

impl Plugin for SequencePlugin {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn type_name(&self) -> &str {
        TYPE_SEQUENCE
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

/// Factory for [`register_type`](Registry::register_type).
pub fn factory() -> PluginFactory {
    Arc::new(|ctor| {
        Box::pin(async move {
            let args: SequenceArgs = if ctor.args.is_null() {
                SequenceArgs::default()
            } else {
                serde_json::from_value(ctor.args).map_err(|e| {
                    braid_core::error::Error::invalid_config(format!("sequence args: {e}"))
                })?
            };
            let plugin = SequencePlugin::new(&ctor.registry, ctor.tag, &args.exec)?;
            Ok(Arc::new(plugin) as Arc<dyn Plugin>)
        })
    })
}
