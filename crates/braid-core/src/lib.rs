//! # Braid Core
//!
//! Foundation types for the Braid query-execution engine.
//!
//! Braid is a programmable recursive DNS router: every inbound query walks a
//! user-defined chain of plugins that inspect, transform, branch on, and
//! ultimately resolve (or synthesize) the answer. This crate holds the
//! pieces everything else builds on:
//!
//! - **Message model**: a deep-clonable in-memory DNS message with reply
//!   synthesis ([`Message`], [`Question`], [`Record`], [`Rcode`]).
//! - **Query context**: the mutable per-query record carried through the
//!   chain ([`QueryContext`], [`QueryStatus`], [`ClientMeta`]).
//! - **Capability traits**: what a plugin can do ([`Executable`],
//!   [`Matcher`], [`Service`], [`Plugin`]).
//! - **Chain abstraction**: linked executable nodes with explicit
//!   continuations ([`ChainNode`], [`exec_chain`]).
//! - **Errors**: the unified taxonomy every node propagates upward
//!   ([`Error`]).
//!
//! The chain contract in one sentence: each node receives its continuation
//! explicitly and decides whether, when, and against *which context* to run
//! it. Control-flow combinators, the registry, and the server handler live
//! in `braid-engine`.

pub mod chain;
pub mod context;
pub mod error;
pub mod message;
pub mod plugin;

pub use chain::{ChainNode, ExecNode, NodeLink, NodeRef, exec_chain, tail};
pub use context::{ClientMeta, QueryContext, QueryStatus, Transport};
pub use error::{Error, Result};
pub use message::{
    DnsClass, Header, Message, Question, RData, Rcode, Record, RecordType, ip_from_reverse_name,
    reverse_name,
};
pub use plugin::{Executable, Matcher, Plugin, Service};
