//! # Braid
//!
//! A programmable recursive DNS router: every inbound query walks a
//! user-defined chain of plugins that inspect, transform, branch on, and
//! ultimately resolve (or synthesize) the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌───────────────┐     ┌─────────────────────────┐
//! │ Transport │────▶│ ServerHandler │────▶│ entry chain             │
//! │ (UDP/TCP) │     │  limiter +    │     │  if/else ─ parallel ─   │
//! └───────────┘     │  SERVFAIL     │     │  fallback ─ load_balance│
//!                   └───────────────┘     └─────────────────────────┘
//! ```
//!
//! - **braid-core**: message model, query context, capability traits, the
//!   chain contract.
//! - **braid-engine**: registry, combinator nodes, parser, server handler,
//!   built-in plugins.
//! - **braid-runtime**: configuration and process assembly.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use braid::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BraidRuntime::from_config(braid_runtime::load_config()?).await?;
//!     let handler = runtime.handler();
//!     // hand `handler` to your listeners; each query:
//!     //   handler.serve(&token, &mut qctx, &mut writer).await
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub use braid_core::*;

pub use braid_engine;
pub use braid_runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use braid::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use braid_runtime::BraidRuntime;

    // Engine surface transports and plugin authors touch
    pub use braid_engine::{Registry, ResponseWriter, ServerHandler, parse_chain};

    // Core traits for custom plugins
    pub use braid_core::{
        ClientMeta, Executable, Matcher, Message, Plugin, QueryContext, QueryStatus, Service,
        exec_chain,
    };
}
