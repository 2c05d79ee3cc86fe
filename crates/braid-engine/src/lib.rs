//! # Braid Engine
//!
//! The query-execution engine of the Braid DNS router: everything between a
//! parsed configuration and a written response.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────────┐     ┌─────────────────────────┐
//! │ Transport │────▶│ ServerHandler │────▶│ entry chain             │
//! │ (external)│     │ (limiter,     │     │  RefNode ─ Conditional  │
//! └───────────┘     │  SERVFAIL)    │     │  ─ Parallel ─ Fallback… │
//!                   └──────────────┘     └─────────────────────────┘
//!                           │                       │
//!                           ▼                       ▼
//!                       Registry  ◀───────── plugins by tag
//! ```
//!
//! - [`Registry`]: tag → plugin map plus type-name → factory map.
//! - [`PluginWrapper`]: capability flags probed once at registration.
//! - [`parser::parse_chain`]: configuration tree → linked chain.
//! - [`nodes`]: the control-flow combinators (if/else, parallel race,
//!   fallback with health tracking, round-robin).
//! - [`ServerHandler`]: per-query entry point; the only place internal
//!   errors become SERVFAIL.
//! - [`builtin`]: the `sequence` and `reverse_lookup` plugin types and the
//!   reserved `_`-tag sentinels.

pub mod builtin;
pub mod handler;
pub mod matcher;
pub mod nodes;
pub mod parser;
pub mod registry;
pub mod tracker;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod testutil;

pub use handler::{ResponseWriter, ServerHandler};
pub use matcher::{BatchMatchAnd, BatchMatchOr, NegateMatcher, RefMatcher, negate};
pub use nodes::{ConditionalNode, FallbackNode, LoadBalanceNode, ParallelNode, RefNode};
pub use parser::parse_chain;
pub use registry::{PluginCtor, PluginFactory, Registry};
pub use tracker::StatusTracker;
pub use wrapper::{Capability, PluginWrapper};
