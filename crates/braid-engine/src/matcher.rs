//! Matcher combinators.
//!
//! Conditional nodes evaluate lists of matchers; these combinators give the
//! lists their semantics:
//!
//! - [`BatchMatchOr`] — left to right, first `true` wins, first error
//!   propagates.
//! - [`BatchMatchAnd`] — left to right, first `false` wins, first error
//!   propagates.
//! - [`NegateMatcher`] — inverts its inner matcher. Building a negation of
//!   a negation yields the inner matcher back ([`negate`]).
//! - [`RefMatcher`] — resolves a tag against the registry at match time, so
//!   hot-swapped plugins take effect immediately.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use braid_core::context::QueryContext;
use braid_core::error::Result;
use braid_core::plugin::Matcher;

use crate::registry::Registry;

/// A matcher resolved from the registry by tag on every evaluation.
pub struct RefMatcher {
    registry: Registry,
    tag: String,
}

impl RefMatcher {
    /// Creates a matcher referencing the plugin registered under `tag`.
    pub fn new(registry: Registry, tag: impl Into<String>) -> Self {
        Self {
            registry,
            tag: tag.into(),
        }
    }

    /// The referenced tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl Matcher for RefMatcher {
    async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool> {
        let wrapper = self.registry.get(&self.tag)?;
        wrapper.match_query(ctx, qctx).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inverts the verdict of its inner matcher. Errors pass through.
pub struct NegateMatcher {
    inner: Arc<dyn Matcher>,
}

impl NegateMatcher {
    /// Wraps `inner`. Prefer [`negate`], which collapses double negation.
    pub fn new(inner: Arc<dyn Matcher>) -> Self {
        Self { inner }
    }

    /// Returns the wrapped matcher.
    pub fn inner(&self) -> &Arc<dyn Matcher> {
        &self.inner
    }
}

#[async_trait]
impl Matcher for NegateMatcher {
    async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool> {
        Ok(!self.inner.match_query(ctx, qctx).await?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Negates `matcher`, collapsing double negation to the inner matcher.
pub fn negate(matcher: Arc<dyn Matcher>) -> Arc<dyn Matcher> {
    match matcher.as_any().downcast_ref::<NegateMatcher>() {
        Some(negated) => negated.inner().clone(),
        None => Arc::new(NegateMatcher::new(matcher)),
    }
}

/// OR over an ordered list of matchers.
///
/// An empty list never matches.
pub struct BatchMatchOr {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl BatchMatchOr {
    /// Creates the combinator.
    pub fn new(matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

#[async_trait]
impl Matcher for BatchMatchOr {
    async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool> {
        for matcher in &self.matchers {
            if matcher.match_query(ctx, qctx).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// AND over an ordered list of matchers.
///
/// An empty list always matches.
pub struct BatchMatchAnd {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl BatchMatchAnd {
    /// Creates the combinator.
    pub fn new(matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

#[async_trait]
impl Matcher for BatchMatchAnd {
    async fn match_query(&self, ctx: &CancellationToken, qctx: &QueryContext) -> Result<bool> {
        for matcher in &self.matchers {
            if !matcher.match_query(ctx, qctx).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
