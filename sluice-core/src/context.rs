//! # Event contexts
//!
//! Every in-flight request owns a tree of contexts. The root context is
//! created when a message enters a flow; scopes fork child contexts to run
//! nested chains without completing the parent.
//!
//! A context goes through two phases:
//!
//! - **Response**: a single-assignment slot holding the outcome. The first
//!   call to [`EventContext::resolve`] wins; later calls are no-ops.
//! - **Termination**: reached once the response is set and every child has
//!   terminated. Parents never terminate before their children.
//!
//! Contexts live in a [`ContextArena`] indexed by [`ContextId`]. Children only
//! store their parent's id, and [`EventContext`] handles only hold the id and
//! the arena, so no reference cycles form between contexts. A terminated
//! context leaves the pending index and is kept in a bounded retention buffer
//! for late diagnostic lookups.
//!
//! Both async and blocking callers observe the response through the same
//! [`Completion`] primitive, a `tokio::sync::watch` slot.

use crate::error::{ContextError, ProcessError};
use crate::message::Event;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Outcome of processing: an event, no event (consumed), or an error.
pub type Response = Result<Option<Event>, ProcessError>;

type BeforeResponse = Box<dyn FnOnce(&Response) + Send>;

/// Identifier of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(Uuid);

impl ContextId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Options for forking a child context.
#[derive(Debug, Clone, Default)]
pub struct ChildOptions {
    /// Resolve the parent with an empty response when the child resolves empty.
    pub complete_parent_on_empty: bool,
    /// Name of the component that forked the child.
    pub location: Option<String>,
}

impl ChildOptions {
    /// Options that complete the parent on an empty child result.
    pub fn completing_parent() -> Self {
        Self {
            complete_parent_on_empty: true,
            location: None,
        }
    }

    /// Sets the location.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Configuration of a [`ContextArena`].
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(default)]
pub struct ContextArenaConfig {
    /// How many terminated contexts are kept for diagnostic lookup.
    #[builder(default = 256)]
    pub retain_settled: usize,
}

impl Default for ContextArenaConfig {
    fn default() -> Self {
        Self {
            retain_settled: 256,
        }
    }
}

/// Diagnostic snapshot of a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    /// Context id.
    pub id: ContextId,
    /// Parent id, for child contexts.
    pub parent: Option<ContextId>,
    /// Id of the root of the tree.
    pub root: ContextId,
    /// Component that forked this context.
    pub location: Option<String>,
    /// Children that have not terminated yet.
    pub pending_children: usize,
    /// Whether the response is set.
    pub resolved: bool,
    /// Whether the context terminated.
    pub terminated: bool,
}

struct NodeState {
    children: HashSet<ContextId>,
    responded: bool,
    terminated: bool,
    before_response: Vec<BeforeResponse>,
    // Set together with `responded`, ahead of the watch publication.
    response: Option<Response>,
}

struct ContextNode {
    id: ContextId,
    parent: Option<ContextId>,
    root: ContextId,
    location: Option<String>,
    complete_parent_on_empty: bool,
    response: watch::Sender<Option<Response>>,
    terminated: watch::Sender<bool>,
    state: Mutex<NodeState>,
}

impl ContextNode {
    fn new(
        id: ContextId,
        parent: Option<ContextId>,
        root: ContextId,
        options: ChildOptions,
    ) -> Self {
        Self {
            id,
            parent,
            root,
            location: options.location,
            complete_parent_on_empty: options.complete_parent_on_empty,
            response: watch::channel(None).0,
            terminated: watch::channel(false).0,
            state: Mutex::new(NodeState {
                children: HashSet::new(),
                responded: false,
                terminated: false,
                before_response: Vec::new(),
                response: None,
            }),
        }
    }

    fn info(&self) -> ContextInfo {
        let state = self.state.lock();
        ContextInfo {
            id: self.id,
            parent: self.parent,
            root: self.root,
            location: self.location.clone(),
            pending_children: state.children.len(),
            resolved: state.responded,
            terminated: state.terminated,
        }
    }
}

/// Registry of every pending context.
pub struct ContextArena {
    pending: DashMap<ContextId, Arc<ContextNode>>,
    settled: Mutex<VecDeque<Arc<ContextNode>>>,
    config: ContextArenaConfig,
}

impl ContextArena {
    /// Creates an arena.
    pub fn new(config: ContextArenaConfig) -> Arc<Self> {
        Arc::new(Self {
            pending: DashMap::new(),
            settled: Mutex::new(VecDeque::new()),
            config,
        })
    }

    /// Creates an arena with the default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(ContextArenaConfig::default())
    }

    /// Creates a root context, the entry point of one request.
    pub fn new_root(self: &Arc<Self>) -> EventContext {
        self.new_root_at(None::<String>)
    }

    /// Creates a root context tagged with the location that created it.
    pub fn new_root_at(self: &Arc<Self>, location: Option<impl Into<String>>) -> EventContext {
        let id = ContextId::generate();
        let options = ChildOptions {
            complete_parent_on_empty: false,
            location: location.map(Into::into),
        };
        self.pending
            .insert(id, Arc::new(ContextNode::new(id, None, id, options)));
        EventContext {
            id,
            arena: Arc::clone(self),
        }
    }

    /// Number of contexts that have not terminated.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Diagnostic snapshot of a pending or recently settled context.
    pub fn lookup(&self, id: ContextId) -> Option<ContextInfo> {
        self.node(id).map(|node| node.info())
    }

    /// Drops every retained settled context.
    pub fn clear_settled(&self) {
        self.settled.lock().clear();
    }

    fn node(&self, id: ContextId) -> Option<Arc<ContextNode>> {
        if let Some(node) = self.pending.get(&id) {
            return Some(Arc::clone(node.value()));
        }
        self.settled
            .lock()
            .iter()
            .find(|node| node.id == id)
            .cloned()
    }

    fn pending_node(&self, id: ContextId) -> Option<Arc<ContextNode>> {
        self.pending.get(&id).map(|node| Arc::clone(node.value()))
    }

    fn resolve(&self, node: &Arc<ContextNode>, response: Response) -> bool {
        let callbacks = {
            let mut state = node.state.lock();
            if state.responded {
                return false;
            }
            state.responded = true;
            state.response = Some(response.clone());
            std::mem::take(&mut state.before_response)
        };
        for callback in callbacks {
            callback(&response);
        }

        let empty = matches!(response, Ok(None));
        node.response.send_replace(Some(response));
        tracing::trace!(context = %node.id, empty, "context resolved");

        if empty && node.complete_parent_on_empty {
            if let Some(parent) = node.parent.and_then(|id| self.pending_node(id)) {
                self.resolve(&parent, Ok(None));
            }
        }
        self.try_terminate(node);
        true
    }

    fn try_terminate(&self, node: &Arc<ContextNode>) {
        {
            let mut state = node.state.lock();
            if state.terminated || !state.responded || !state.children.is_empty() {
                return;
            }
            state.terminated = true;
        }
        node.terminated.send_replace(true);
        self.pending.remove(&node.id);
        if self.config.retain_settled > 0 {
            let mut settled = self.settled.lock();
            if settled.len() >= self.config.retain_settled {
                settled.pop_front();
            }
            settled.push_back(Arc::clone(node));
        }
        tracing::trace!(context = %node.id, "context terminated");

        if let Some(parent) = node.parent.and_then(|id| self.pending_node(id)) {
            let removed = parent.state.lock().children.remove(&node.id);
            if removed {
                self.try_terminate(&parent);
            }
        }
    }
}

impl fmt::Debug for ContextArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextArena")
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Handle to a context.
///
/// Cheap to clone. Operations on a context that has been evicted from the
/// arena are no-ops.
#[derive(Clone)]
pub struct EventContext {
    id: ContextId,
    arena: Arc<ContextArena>,
}

impl EventContext {
    /// The context id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The arena this context lives in.
    pub fn arena(&self) -> &Arc<ContextArena> {
        &self.arena
    }

    /// Parent id, if this is a child context.
    pub fn parent_id(&self) -> Option<ContextId> {
        self.arena.node(self.id).and_then(|node| node.parent)
    }

    /// Id shared by every context of one request tree.
    pub fn correlation_id(&self) -> ContextId {
        self.arena
            .node(self.id)
            .map_or(self.id, |node| node.root)
    }

    /// Handle to the parent context.
    pub fn parent(&self) -> Option<EventContext> {
        self.parent_id().map(|id| EventContext {
            id,
            arena: Arc::clone(&self.arena),
        })
    }

    /// Forks a child context registered under this one.
    ///
    /// Always succeeds. A child forked from a context that already terminated
    /// is not tracked by it.
    pub fn new_child(&self, options: ChildOptions) -> EventContext {
        let id = ContextId::generate();
        let parent = self.arena.node(self.id);
        let root = parent.as_ref().map_or(self.id, |node| node.root);
        let node = Arc::new(ContextNode::new(id, Some(self.id), root, options));
        self.arena.pending.insert(id, node);

        match parent {
            Some(parent) => {
                let mut state = parent.state.lock();
                if state.terminated {
                    tracing::debug!(parent = %self.id, child = %id, "child forked from a terminated context");
                } else {
                    state.children.insert(id);
                }
            }
            None => {
                tracing::debug!(parent = %self.id, child = %id, "child forked from an unknown context");
            }
        }
        EventContext {
            id,
            arena: Arc::clone(&self.arena),
        }
    }

    /// Sets the response. Returns `false` if it was already set.
    pub fn resolve(&self, response: Response) -> bool {
        match self.arena.node(self.id) {
            Some(node) => self.arena.resolve(&node, response),
            None => false,
        }
    }

    /// Resolves with an event, or with no event.
    pub fn resolve_success(&self, event: Option<Event>) -> bool {
        self.resolve(Ok(event))
    }

    /// Resolves with an error.
    pub fn resolve_error(&self, error: ProcessError) -> bool {
        self.resolve(Err(error))
    }

    /// Whether the response is set.
    pub fn is_resolved(&self) -> bool {
        self.arena
            .node(self.id)
            .is_some_and(|node| node.state.lock().responded)
    }

    /// Whether the context terminated.
    ///
    /// Contexts no longer known to the arena are reported as terminated.
    pub fn is_terminated(&self) -> bool {
        self.arena
            .node(self.id)
            .is_none_or(|node| node.state.lock().terminated)
    }

    /// Registers a callback run right before the response becomes observable.
    ///
    /// If the response is already set the callback runs immediately.
    pub fn on_before_response(&self, callback: impl FnOnce(&Response) + Send + 'static) {
        let Some(node) = self.arena.node(self.id) else {
            return;
        };
        let response = {
            let mut state = node.state.lock();
            if !state.responded {
                state.before_response.push(Box::new(callback));
                return;
            }
            state.response.clone()
        };
        if let Some(response) = &response {
            callback(response);
        }
    }

    /// Subscribes to the response and termination of this context.
    pub fn subscribe(&self) -> Result<Completion, ContextError> {
        let node = self
            .arena
            .node(self.id)
            .ok_or(ContextError::Unknown(self.id))?;
        Ok(Completion {
            id: self.id,
            response: node.response.subscribe(),
            terminated: node.terminated.subscribe(),
        })
    }

    /// Waits for the response of this context.
    pub async fn response(&self) -> Response {
        let mut completion = self.subscribe()?;
        completion.wait().await
    }

    /// Diagnostic snapshot.
    pub fn info(&self) -> Option<ContextInfo> {
        self.arena.lookup(self.id)
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventContext").field(&self.id).finish()
    }
}

impl PartialEq for EventContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.arena, &other.arena)
    }
}

/// Subscription to a context's response and termination.
///
/// Holding a `Completion` keeps the response observable even after the context
/// has been evicted from its arena.
#[derive(Debug, Clone)]
pub struct Completion {
    id: ContextId,
    response: watch::Receiver<Option<Response>>,
    terminated: watch::Receiver<bool>,
}

impl Completion {
    /// Id of the observed context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Waits until the response is set and returns it.
    pub async fn wait(&mut self) -> Response {
        match self.response.wait_for(Option::is_some).await {
            Ok(response) => response
                .clone()
                .unwrap_or_else(|| Err(ContextError::Abandoned(self.id).into())),
            Err(_) => Err(ContextError::Abandoned(self.id).into()),
        }
    }

    /// Blocks the calling thread until the response is set.
    ///
    /// Must not be called from an async task: it parks the thread.
    pub fn wait_blocking(&mut self) -> Response {
        futures::executor::block_on(self.wait())
    }

    /// The response, if it is set already.
    pub fn try_get(&self) -> Option<Response> {
        self.response.borrow().clone()
    }

    /// Waits until the context terminated.
    pub async fn terminated(&mut self) {
        let _ = self.terminated.wait_for(|terminated| *terminated).await;
    }

    /// Whether the context terminated.
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }
}
