//! Chain parser.
//!
//! Translates an untyped configuration tree into a linked chain. Each entry
//! of an `exec` list is recognized by shape:
//!
//! | Shape | Trigger keys | Node |
//! |---|---|---|
//! | bare string | — | [`RefNode`] to a registered executable |
//! | map | `if` / `if_and` | [`ConditionalNode`] |
//! | map | `parallel` | [`ParallelNode`] |
//! | map | `primary` / `secondary` | [`FallbackNode`] |
//! | map | `load_balance` | [`LoadBalanceNode`] |
//!
//! Matcher lists accept tag strings, `!tag` negation, or nested lists of
//! tags. Chains are built back to front, so composite nodes receive their
//! successor at construction time and graft their sub-branch tails onto it
//! exactly once; nothing is re-linked during execution.
//!
//! When a map carries both `if` and `if_and`, `if` takes priority and
//! `if_and` is ignored — the two are never combined.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use braid_core::chain::NodeRef;
use braid_core::ChainNode;
use braid_core::error::{Error, Result};
use braid_core::plugin::Matcher;

use crate::matcher::{BatchMatchAnd, BatchMatchOr, RefMatcher, negate};
use crate::nodes::{ConditionalNode, FallbackNode, LoadBalanceNode, ParallelNode, RefNode};
use crate::registry::Registry;
use crate::tracker::StatusTracker;

const DEFAULT_FALLBACK_THRESHOLD: usize = 5;
const DEFAULT_FALLBACK_STAT_LENGTH: usize = 10;

/// Parses an `exec` list into a chain. Returns `None` for an empty list.
pub fn parse_chain(registry: &Registry, entries: &[Value]) -> Result<Option<NodeRef>> {
    parse_entries(registry, entries, None)
}

/// Parses `entries` into a chain whose tail links to `tail`.
///
/// Building back to front means every node knows its successor at
/// construction time, and composite branches are grafted for free.
fn parse_entries(
    registry: &Registry,
    entries: &[Value],
    tail: Option<NodeRef>,
) -> Result<Option<NodeRef>> {
    let mut next = tail;
    for entry in entries.iter().rev() {
        next = Some(parse_entry(registry, entry, next)?);
    }
    Ok(next)
}

fn parse_entry(registry: &Registry, entry: &Value, next: Option<NodeRef>) -> Result<NodeRef> {
    match entry {
        Value::String(tag) => {
            let node = RefNode::new(registry.clone(), tag.clone());
            node.set_next(next);
            Ok(node)
        }
        Value::Object(map) => {
            let node: NodeRef = if map.contains_key("if") || map.contains_key("if_and") {
                parse_conditional(registry, entry, next.clone())?
            } else if map.contains_key("parallel") {
                parse_parallel(registry, entry, next.clone())?
            } else if map.contains_key("primary") || map.contains_key("secondary") {
                parse_fallback(registry, entry, next.clone())?
            } else if map.contains_key("load_balance") {
                parse_load_balance(registry, entry, next.clone())?
            } else {
                return Err(Error::invalid_config(
                    "chain entry map has none of the recognized keys \
                     (if, if_and, parallel, primary, secondary, load_balance)",
                ));
            };
            node.set_next(next);
            Ok(node)
        }
        other => Err(Error::invalid_config(format!(
            "chain entry must be a tag string or a map, got {other}"
        ))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(entry: &Value) -> Result<T> {
    serde_json::from_value(entry.clone())
        .map_err(|e| Error::invalid_config(format!("bad chain entry: {e}")))
}

// ─── if / if_and ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IfBlock {
    #[serde(rename = "if", default)]
    if_: Option<Value>,
    #[serde(default)]
    if_and: Option<Value>,
    #[serde(default)]
    exec: Vec<Value>,
    #[serde(default)]
    else_exec: Vec<Value>,
}

fn parse_conditional(
    registry: &Registry,
    entry: &Value,
    next: Option<NodeRef>,
) -> Result<NodeRef> {
    let block: IfBlock = decode(entry)?;

    // `if` wins when both are present; they are never combined.
    let condition: Arc<dyn Matcher> = match (&block.if_, &block.if_and) {
        (Some(or_list), _) => Arc::new(BatchMatchOr::new(parse_matchers(registry, or_list)?)),
        (None, Some(and_list)) => {
            Arc::new(BatchMatchAnd::new(parse_matchers(registry, and_list)?))
        }
        (None, None) => {
            return Err(Error::invalid_config(
                "conditional entry needs 'if' or 'if_and'",
            ));
        }
    };

    // Branch tails are the outer successor: a branch that falls through
    // continues with the enclosing chain.
    let then_branch = parse_entries(registry, &block.exec, next.clone())?;
    let else_branch = parse_entries(registry, &block.else_exec, next)?;

    Ok(ConditionalNode::new(condition, then_branch, else_branch))
}

/// Parses a matcher reference list: a tag string, `!tag`, or a list of
/// those. Direct [`Matcher`] objects are supported through the node
/// constructors, not through configuration.
fn parse_matchers(registry: &Registry, value: &Value) -> Result<Vec<Arc<dyn Matcher>>> {
    match value {
        Value::String(tag) => Ok(vec![parse_matcher_tag(registry, tag)?]),
        Value::Array(items) => {
            let mut matchers = Vec::with_capacity(items.len());
            for item in items {
                matchers.extend(parse_matchers(registry, item)?);
            }
            Ok(matchers)
        }
        other => Err(Error::invalid_config(format!(
            "matcher reference must be a tag string or a list, got {other}"
        ))),
    }
}

fn parse_matcher_tag(registry: &Registry, tag: &str) -> Result<Arc<dyn Matcher>> {
    match tag.strip_prefix('!') {
        Some(inner) if !inner.is_empty() => Ok(negate(Arc::new(RefMatcher::new(
            registry.clone(),
            inner,
        )))),
        Some(_) => Err(Error::invalid_config("matcher tag '!' names nothing")),
        None if tag.is_empty() => Err(Error::invalid_config("matcher tag must not be empty")),
        None => Ok(Arc::new(RefMatcher::new(registry.clone(), tag))),
    }
}

// ─── parallel ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ParallelBlock {
    parallel: Vec<Vec<Value>>,
    /// Per-branch timeout in seconds; 0 means the default.
    #[serde(default)]
    timeout: u64,
}

fn parse_parallel(registry: &Registry, entry: &Value, next: Option<NodeRef>) -> Result<NodeRef> {
    let block: ParallelBlock = decode(entry)?;
    if block.parallel.is_empty() {
        return Err(Error::invalid_config("'parallel' needs at least one branch"));
    }

    let mut branches = Vec::with_capacity(block.parallel.len());
    for branch in &block.parallel {
        if let Some(head) = parse_entries(registry, branch, next.clone())? {
            branches.push(head);
        }
    }

    let timeout = (block.timeout > 0).then(|| Duration::from_secs(block.timeout));
    Ok(ParallelNode::new(branches, timeout))
}

// ─── primary / secondary ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FallbackBlock {
    #[serde(default)]
    primary: Vec<Value>,
    #[serde(default)]
    secondary: Vec<Value>,
    /// Fast-fallback delay in milliseconds; 0 disables the timer path.
    #[serde(default)]
    fast_fallback: u64,
    #[serde(default)]
    always_standby: bool,
    /// Windowed failure threshold; 0 means the default.
    #[serde(default)]
    threshold: usize,
    /// Window length; 0 means the default.
    #[serde(default)]
    stat_length: usize,
}

fn parse_fallback(registry: &Registry, entry: &Value, next: Option<NodeRef>) -> Result<NodeRef> {
    let block: FallbackBlock = decode(entry)?;

    let primary = parse_entries(registry, &block.primary, next.clone())?;
    let secondary = parse_entries(registry, &block.secondary, next)?;

    let fast_fallback = (block.fast_fallback > 0).then(|| Duration::from_millis(block.fast_fallback));

    // Stat-based tracking drives normal mode; in fast mode it is only kept
    // when explicitly configured.
    let tracker = if fast_fallback.is_none() || block.threshold > 0 || block.stat_length > 0 {
        let threshold = if block.threshold > 0 {
            block.threshold
        } else {
            DEFAULT_FALLBACK_THRESHOLD
        };
        let stat_length = if block.stat_length > 0 {
            block.stat_length
        } else {
            DEFAULT_FALLBACK_STAT_LENGTH
        };
        if threshold > stat_length {
            return Err(Error::invalid_config(format!(
                "fallback threshold {threshold} exceeds stat_length {stat_length}"
            )));
        }
        Some(Arc::new(StatusTracker::new(threshold, stat_length)))
    } else {
        None
    };

    Ok(FallbackNode::new(
        primary,
        secondary,
        tracker,
        fast_fallback,
        block.always_standby,
    ))
}

// ─── load_balance ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoadBalanceBlock {
    load_balance: Vec<Vec<Value>>,
}

fn parse_load_balance(
    registry: &Registry,
    entry: &Value,
    next: Option<NodeRef>,
) -> Result<NodeRef> {
    let block: LoadBalanceBlock = decode(entry)?;
    if block.load_balance.is_empty() {
        return Err(Error::invalid_config(
            "'load_balance' needs at least one branch",
        ));
    }

    let mut branches = Vec::with_capacity(block.load_balance.len());
    for branch in &block.load_balance {
        if let Some(head) = parse_entries(registry, branch, next.clone())? {
            branches.push(head);
        }
    }
    Ok(LoadBalanceNode::new(branches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ExecPlugin, MatchPlugin, marker_of, new_qctx};
    use crate::wrapper::PluginWrapper;
    use braid_core::chain::exec_chain;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    async fn registry_with_basics() -> (Registry, Arc<ExecPlugin>, Arc<MatchPlugin>) {
        let reg = Registry::new();
        let target = Arc::new(ExecPlugin::respond("e_target", "r_target"));
        let m_err = Arc::new(MatchPlugin::failing("m_err"));
        reg.register(PluginWrapper::wrap(target.clone()), true).await.unwrap();
        reg.register(PluginWrapper::wrap(m_err.clone()), true).await.unwrap();
        reg.register(
            PluginWrapper::wrap(Arc::new(MatchPlugin::new("m_true", true))),
            true,
        )
        .await
        .unwrap();
        reg.register(
            PluginWrapper::wrap(Arc::new(MatchPlugin::new("m_false", false))),
            true,
        )
        .await
        .unwrap();
        reg.register(
            PluginWrapper::wrap(Arc::new(ExecPlugin::respond("e_ok", "r_ok"))),
            true,
        )
        .await
        .unwrap();
        (reg, target, m_err)
    }

    #[tokio::test]
    async fn test_if_or_with_negation() {
        // `!m_false` matches, so the OR fires and e_target responds.
        let (reg, _, _) = registry_with_basics().await;
        let entries = vec![json!({ "if": ["!m_false", "m_false"], "exec": ["e_target"] })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }

    #[tokio::test]
    async fn test_if_or_short_circuits_before_erroring_matcher() {
        let (reg, _, m_err) = registry_with_basics().await;
        let entries = vec![json!({ "if": ["m_true", "m_err"], "exec": ["e_ok"] })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(m_err.calls(), 0);
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_ok"));
    }

    #[tokio::test]
    async fn test_if_takes_priority_over_if_and() {
        let (reg, _, _) = registry_with_basics().await;
        // if_and would evaluate false, but `if` wins and matches.
        let entries = vec![json!({
            "if": ["m_true"],
            "if_and": ["m_false"],
            "exec": ["e_target"],
        })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert!(qctx.response().is_some());
    }

    #[tokio::test]
    async fn test_if_with_false_matcher_is_noop_for_downstream() {
        let (reg, _, _) = registry_with_basics().await;
        let entries = vec![
            json!({ "if": ["m_false"], "exec": ["e_ok"] }),
            json!("e_target"),
        ];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }

    #[tokio::test]
    async fn test_singleton_sequence_equals_bare_tag() {
        let (reg, _, _) = registry_with_basics().await;
        let ctx = CancellationToken::new();

        let mut direct = new_qctx();
        let chain = parse_chain(&reg, &[json!("e_target")]).unwrap();
        exec_chain(&ctx, &mut direct, chain).await.unwrap();

        let mut via_if = new_qctx();
        let chain = parse_chain(&reg, &[json!({ "if": ["m_true"], "exec": ["e_target"] })]).unwrap();
        exec_chain(&ctx, &mut via_if, chain).await.unwrap();

        assert_eq!(
            marker_of(direct.response().unwrap()),
            marker_of(via_if.response().unwrap())
        );
    }

    #[tokio::test]
    async fn test_else_branch_runs_when_unmatched() {
        let (reg, _, _) = registry_with_basics().await;
        let entries = vec![json!({
            "if": ["m_false"],
            "exec": ["e_ok"],
            "else_exec": ["e_target"],
        })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }

    #[tokio::test]
    async fn test_parallel_block_races_branches() {
        let (reg, _, _) = registry_with_basics().await;
        reg.register(
            PluginWrapper::wrap(Arc::new(ExecPlugin::failing("e_bad"))),
            true,
        )
        .await
        .unwrap();
        let entries = vec![json!({ "parallel": [["e_bad"], ["e_target"]] })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }

    #[tokio::test]
    async fn test_load_balance_block_round_robins() {
        let reg = Registry::new();
        for n in 1..=3 {
            reg.register(
                PluginWrapper::wrap(Arc::new(ExecPlugin::respond(
                    &format!("b{n}"),
                    &format!("m{n}"),
                ))),
                true,
            )
            .await
            .unwrap();
        }
        let entries = vec![json!({ "load_balance": [["b1"], ["b2"], ["b3"]] })];
        let chain = parse_chain(&reg, &entries).unwrap();
        let ctx = CancellationToken::new();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let mut qctx = new_qctx();
            exec_chain(&ctx, &mut qctx, chain.clone()).await.unwrap();
            seen.push(marker_of(qctx.response().unwrap()).unwrap().to_string());
        }
        assert_eq!(seen, vec!["m2", "m3", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_fallback_block_shapes() {
        let (reg, _, _) = registry_with_basics().await;
        reg.register(
            PluginWrapper::wrap(Arc::new(ExecPlugin::failing("e_bad"))),
            true,
        )
        .await
        .unwrap();
        let entries = vec![json!({
            "primary": ["e_bad"],
            "secondary": ["e_target"],
            "fast_fallback": 50,
        })];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }

    #[tokio::test]
    async fn test_unrecognized_shapes_fail_at_parse_time() {
        let reg = Registry::new();
        assert!(parse_chain(&reg, &[json!(42)]).is_err());
        assert!(parse_chain(&reg, &[json!({ "unknown": true })]).is_err());
        assert!(parse_chain(&reg, &[json!({ "parallel": [] })]).is_err());
        assert!(parse_chain(&reg, &[json!({ "if": ["!"], "exec": [] })]).is_err());
        assert!(
            parse_chain(
                &reg,
                &[json!({ "primary": ["a"], "secondary": ["b"], "threshold": 9, "stat_length": 4 })]
            )
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_composite_branch_falls_through_to_outer_chain() {
        let (reg, _, _) = registry_with_basics().await;
        let observer = Arc::new(ExecPlugin::noop("observer"));
        reg.register(PluginWrapper::wrap(observer.clone()), true)
            .await
            .unwrap();

        // The matched branch holds a pass-through observer; the outer
        // chain's e_target still produces the response.
        let entries = vec![
            json!({ "if": ["m_true"], "exec": ["observer"] }),
            json!("e_target"),
        ];
        let chain = parse_chain(&reg, &entries).unwrap();

        let mut qctx = new_qctx();
        exec_chain(&CancellationToken::new(), &mut qctx, chain)
            .await
            .unwrap();
        assert_eq!(observer.calls(), 1);
        assert_eq!(marker_of(qctx.response().unwrap()), Some("r_target"));
    }
}
