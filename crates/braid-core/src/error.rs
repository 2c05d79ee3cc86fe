//! Unified error types for the Braid query engine.
//!
//! Every chain node reports errors upward; only the server handler converts
//! an error into an on-the-wire SERVFAIL. Nodes never swallow errors except
//! where a contract explicitly says so (side-effect observers log and
//! continue).

use thiserror::Error;

/// Errors produced while executing a query through a plugin chain.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced plugin tag is not present in the registry.
    #[error("tag '{0}' is not defined")]
    TagNotDefined(String),

    /// A configured plugin type has no registered factory.
    #[error("plugin type '{0}' is not defined")]
    TypeNotDefined(String),

    /// A plugin failed; the tag identifies the offender.
    #[error("plugin '{tag}': {source}")]
    Plugin {
        /// Tag of the failing plugin.
        tag: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// No branch of a parallel or fallback node produced a response.
    #[error("no response")]
    NoResponse,

    /// The chain configuration is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The query's cancellation scope was cancelled.
    #[error("query cancelled")]
    Cancelled,

    /// A branch ran past its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A deferred hook failed; the index is its LIFO ordinal.
    #[error("deferred hook #{index}: {source}")]
    Deferred {
        /// Zero-based position in LIFO execution order.
        index: usize,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Plugin-internal error with no dedicated variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates an invalid-configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Wraps `err` with the tag of the plugin that produced it.
    ///
    /// Cancellation and deadline errors propagate verbatim so the server
    /// handler can still recognize them.
    pub fn with_tag(tag: impl Into<String>, err: Error) -> Self {
        match err {
            Error::Cancelled | Error::DeadlineExceeded => err,
            other => Error::Plugin {
                tag: tag.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` for cancellation or deadline errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

/// Result type used across the query engine.
pub type Result<T> = std::result::Result<T, Error>;
