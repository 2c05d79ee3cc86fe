//! Per-query execution context.
//!
//! A [`QueryContext`] is created at query ingress and carried through the
//! chain. It is exclusively owned by whichever chain frame currently
//! executes; nodes that spawn concurrency deep-copy it so a losing branch
//! can never corrupt the caller's state.
//!
//! Besides the query/response pair the context carries a terminal
//! [`QueryStatus`], a process-unique id, client metadata, an integer mark
//! set plugins use to tag paths already taken, and a LIFO stack of deferred
//! hooks that run once the chain has completed (see
//! [`QueryContext::defer_exec`]).

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::plugin::Executable;

/// Process-wide query id counter. Wraps at 2^32.
static NEXT_QUERY_ID: AtomicU32 = AtomicU32::new(0);

const DEFER_IDLE: u8 = 0;
const DEFER_RUNNING: u8 = 1;
const DEFER_DONE: u8 = 2;

/// Terminal state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// No node has produced a terminal payload yet.
    WaitingResponse,
    /// A node produced a response for the client.
    Responded,
    /// The engine could not produce a valid answer.
    ServerFailed,
    /// The query is silently dropped; nothing is written.
    Dropped,
    /// The query was answered with a refusal-style payload.
    Rejected,
}

/// How the client reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Connectionless datagram transport.
    Udp,
    /// Stream transport (TCP, DoT, DoH).
    Stream,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Stream => write!(f, "stream"),
        }
    }
}

/// Client address and transport hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMeta {
    /// Source address of the query.
    pub addr: SocketAddr,
    /// Transport the query arrived over.
    pub transport: Transport,
}

impl ClientMeta {
    /// Creates UDP client metadata.
    pub fn udp(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: Transport::Udp,
        }
    }

    /// Creates stream client metadata.
    pub fn stream(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: Transport::Stream,
        }
    }
}

impl Default for ClientMeta {
    fn default() -> Self {
        Self::udp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
    }
}

/// The mutable per-query record carried through the chain.
pub struct QueryContext {
    q: Message,
    original_query: Message,
    r: Option<Message>,
    status: QueryStatus,
    id: u32,
    start_time: Instant,
    client: ClientMeta,
    marks: Option<HashSet<u32>>,
    deferred: Vec<Arc<dyn Executable>>,
    defer_state: AtomicU8,
}

impl QueryContext {
    /// Creates a context for query `q`.
    ///
    /// # Panics
    ///
    /// Panics if `q` carries no question. Handing the engine a questionless
    /// message is a programmer error in the transport layer.
    pub fn new(q: Message, client: ClientMeta) -> Self {
        assert!(
            q.question.is_some(),
            "QueryContext requires a query with a question"
        );
        Self {
            original_query: q.clone(),
            q,
            r: None,
            status: QueryStatus::WaitingResponse,
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            start_time: Instant::now(),
            client,
            marks: None,
            deferred: Vec::new(),
            defer_state: AtomicU8::new(DEFER_IDLE),
        }
    }

    /// Returns the current (possibly rewritten) query.
    pub fn query(&self) -> &Message {
        &self.q
    }

    /// Returns the current query for mutation.
    pub fn query_mut(&mut self) -> &mut Message {
        &mut self.q
    }

    /// Returns the immutable snapshot taken at creation.
    pub fn original_query(&self) -> &Message {
        &self.original_query
    }

    /// Returns the in-progress response, if any node set one.
    pub fn response(&self) -> Option<&Message> {
        self.r.as_ref()
    }

    /// Returns the in-progress response for mutation.
    pub fn response_mut(&mut self) -> Option<&mut Message> {
        self.r.as_mut()
    }

    /// Stores `r` as-is and moves the context into `status`.
    ///
    /// The caller relinquishes ownership of the message; a `None` response
    /// paired with [`QueryStatus::Dropped`] means nothing gets written.
    pub fn set_response(&mut self, r: Option<Message>, status: QueryStatus) {
        self.r = r;
        self.status = status;
    }

    /// Returns the current status.
    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Returns the process-unique query id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the instant this context was created.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Returns the client metadata.
    pub fn client(&self) -> ClientMeta {
        self.client
    }

    /// Adds `mark` to the mark set, allocating it lazily.
    pub fn add_mark(&mut self, mark: u32) {
        self.marks.get_or_insert_with(HashSet::new).insert(mark);
    }

    /// Returns whether `mark` has been added.
    pub fn has_mark(&self, mark: u32) -> bool {
        self.marks.as_ref().is_some_and(|m| m.contains(&mark))
    }

    /// Deep-copies this context for branch isolation.
    ///
    /// The copy shares nothing mutable with the source: mutating the copy's
    /// query, response, or marks leaves the source untouched. Id, start
    /// time, status, and client metadata are preserved; the deferred-hook
    /// stack is in-flight concurrency state and is *not* copied.
    pub fn copy(&self) -> Self {
        Self {
            q: self.q.clone(),
            original_query: self.original_query.clone(),
            r: self.r.clone(),
            status: self.status,
            id: self.id,
            start_time: self.start_time,
            client: self.client,
            marks: self.marks.clone(),
            deferred: Vec::new(),
            defer_state: AtomicU8::new(DEFER_IDLE),
        }
    }

    /// Copies this context's query, response, status, and marks into `dst`.
    ///
    /// Used by racing nodes to adopt the winning branch's state.
    pub fn copy_to(&self, dst: &mut QueryContext) {
        dst.q = self.q.clone();
        dst.r = self.r.clone();
        dst.status = self.status;
        dst.marks = self.marks.clone();
    }

    /// Registers `hook` to run after the chain completes.
    ///
    /// Hooks run in LIFO order, see [`exec_defer`](Self::exec_defer).
    ///
    /// # Panics
    ///
    /// Panics if deferred hooks are currently executing or have already
    /// executed. Registration is only legal while the chain itself runs.
    pub fn defer_exec(&mut self, hook: Arc<dyn Executable>) {
        assert_eq!(
            self.defer_state.load(Ordering::Acquire),
            DEFER_IDLE,
            "defer_exec called during or after deferred execution"
        );
        self.deferred.push(hook);
    }

    /// Runs the deferred hooks registered on this context, LIFO.
    ///
    /// A failing hook stops further deferrals; its error is surfaced with
    /// the hook's execution ordinal. Hooks see the terminal context and
    /// receive no continuation.
    ///
    /// # Panics
    ///
    /// Panics when re-entered; deferred execution happens exactly once per
    /// context.
    pub async fn exec_defer(&mut self, ctx: &CancellationToken) -> Result<()> {
        if self
            .defer_state
            .compare_exchange(DEFER_IDLE, DEFER_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("exec_defer re-entered");
        }

        let hooks = std::mem::take(&mut self.deferred);
        for (index, hook) in hooks.into_iter().rev().enumerate() {
            if let Err(e) = hook.exec(ctx, self, None).await {
                self.defer_state.store(DEFER_DONE, Ordering::Release);
                return Err(Error::Deferred {
                    index,
                    source: Box::new(e),
                });
            }
        }
        self.defer_state.store(DEFER_DONE, Ordering::Release);
        Ok(())
    }

    /// Returns a one-line summary for log records.
    pub fn info(&self) -> String {
        match &self.q.question {
            Some(q) => format!(
                "query #{} {} from {}/{}",
                self.id, q, self.client.addr, self.client.transport
            ),
            None => format!(
                "query #{} <no question> from {}/{}",
                self.id, self.client.addr, self.client.transport
            ),
        }
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("id", &self.id)
            .field("question", &self.q.question)
            .field("status", &self.status)
            .field("has_response", &self.r.is_some())
            .finish()
    }
}
