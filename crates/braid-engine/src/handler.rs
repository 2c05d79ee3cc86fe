//! Server-side entry handler.
//!
//! One [`ServerHandler::serve`] call per inbound query: acquire a slot from
//! the optional concurrency limiter, execute the configured entry plugin
//! with no outer successor, run the context's deferred hooks, and write the
//! result. This is the **only** place an internal error becomes an
//! on-the-wire SERVFAIL; inner nodes just report errors upward, and no
//! internal error string ever reaches the client.
//!
//! If the caller's scope is cancelled before a limiter slot is acquired the
//! query is silently dropped — nothing is written.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use braid_core::context::{QueryContext, QueryStatus};
use braid_core::error::Result;
use braid_core::message::Message;

use crate::registry::Registry;

/// Sink for the final response, implemented by transports.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Writes `msg` to the client, returning the number of bytes written.
    async fn write(&mut self, msg: &Message) -> io::Result<usize>;
}

/// Per-query entry point with concurrency limiting and fail-safe output.
pub struct ServerHandler {
    registry: Registry,
    entry: String,
    limiter: Option<Arc<Semaphore>>,
}

impl ServerHandler {
    /// Creates a handler that executes the plugin registered under `entry`.
    pub fn new(registry: Registry, entry: impl Into<String>) -> Self {
        Self {
            registry,
            entry: entry.into(),
            limiter: None,
        }
    }

    /// Caps concurrent queries at `limit`; 0 disables the limiter.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.limiter = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// The entry tag this handler executes.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Handles one inbound query.
    ///
    /// Never returns an error: every internal failure is converted into a
    /// SERVFAIL response built from the original query, and write errors
    /// are logged rather than propagated.
    pub async fn serve(
        &self,
        ctx: &CancellationToken,
        qctx: &mut QueryContext,
        writer: &mut dyn ResponseWriter,
    ) {
        let _permit = match &self.limiter {
            Some(limiter) => {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        debug!(query = qctx.id(), "Cancelled before acquiring a slot, dropping query");
                        return;
                    }
                    permit = limiter.clone().acquire_owned() => {
                        match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                // The semaphore is never closed; treat this
                                // like cancellation and drop the query.
                                error!(query = qctx.id(), "Concurrency limiter closed unexpectedly");
                                return;
                            }
                        }
                    }
                }
            }
            None => None,
        };

        let exec_result = self.exec_entry(ctx, qctx).await;
        let defer_result = qctx.exec_defer(ctx).await;

        let failed = exec_result.is_err()
            || defer_result.is_err()
            || qctx.status() == QueryStatus::ServerFailed;
        if let Err(e) = &exec_result {
            warn!(query = %qctx.info(), error = %e, "Entry chain failed");
        }
        if let Err(e) = &defer_result {
            warn!(query = %qctx.info(), error = %e, "Deferred hook failed");
        }

        if failed {
            let servfail = Message::servfail_reply(qctx.original_query());
            qctx.set_response(Some(servfail), QueryStatus::ServerFailed);
        }

        if let Some(response) = qctx.response()
            && let Err(e) = writer.write(response).await
        {
            warn!(query = qctx.id(), error = %e, "Failed to write response");
        }
    }

    async fn exec_entry(&self, ctx: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        let entry = self.registry.get(&self.entry)?;
        // The entry has no outer successor.
        entry.exec(ctx, qctx, None).await
    }
}

impl std::fmt::Debug for ServerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandler")
            .field("entry", &self.entry)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}
