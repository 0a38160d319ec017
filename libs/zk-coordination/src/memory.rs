//! In-memory coordination tree.
//!
//! `MemoryStore` keeps the whole tree behind one mutex and follows the
//! coordination service's rules for creates, ephemeral ownership and one-shot
//! watches. Each [`MemorySession`] is a [`CoordinationHandle`] with its own
//! session id. Besides the handle operations, the store exposes writer and
//! inspection helpers plus fault injection, which is what the tests in this
//! crate drive it with.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::diagnostics::STORE_DIAGNOSTICS_TARGET;
use crate::handle::{
    Acl, CoordinationHandle, CreateMode, MAX_VALUE_SIZE, StoreError, WatchEvent, WatchKind,
};
use crate::path;

const WATCH_CHANNEL_SIZE: usize = 1024;

// result codes used by the store for the `Other` cases
const ZBADARGUMENTS: i32 = -8;
const ZNOTEMPTY: i32 = -111;

/// Store operation, used to address call counters and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetData,
    GetChildren,
    Create,
}

#[derive(Debug)]
struct Node {
    value: Option<Vec<u8>>,
    owner: Option<u64>,
    acl: Acl,
    // creation order, deliberately not sorted
    children: Vec<String>,
}

impl Node {
    fn new(value: Option<Vec<u8>>, owner: Option<u64>, acl: Acl) -> Self {
        Self {
            value,
            owner,
            acl,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<String, Node>,
    data_watches: HashSet<String>,
    child_watches: HashSet<String>,
    faults: HashMap<Operation, VecDeque<StoreError>>,
    calls: HashMap<Operation, u64>,
    expired: HashSet<u64>,
    next_session: u64,
}

impl Inner {
    fn fire(&mut self, events: &broadcast::Sender<WatchEvent>, path: &str, kind: WatchKind) {
        let armed = match kind {
            WatchKind::DataChanged => self.data_watches.remove(path),
            WatchKind::ChildrenChanged => self.child_watches.remove(path),
            WatchKind::Deleted => {
                // both watch types fire on deletion
                let data = self.data_watches.remove(path);
                self.child_watches.remove(path) || data
            }
        };
        if armed {
            debug!(path, ?kind, "watch fired");
            // no receivers is fine
            let _ = events.send(WatchEvent {
                path: path.to_owned(),
                kind,
            });
        }
    }

    fn take_fault(&mut self, op: Operation) -> Option<StoreError> {
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn insert(
        &mut self,
        events: &broadcast::Sender<WatchEvent>,
        path: &str,
        value: Option<Vec<u8>>,
        owner: Option<u64>,
        acl: Acl,
    ) -> Result<(), StoreError> {
        if path::validate(path).is_err() || path == path::ROOT {
            return Err(bad_arguments(format!("invalid path {path}")));
        }
        if value.as_ref().is_some_and(|v| v.len() > MAX_VALUE_SIZE) {
            warn!(
                target: STORE_DIAGNOSTICS_TARGET,
                path,
                max = MAX_VALUE_SIZE,
                "rejected value over size limit"
            );
            return Err(bad_arguments(format!(
                "value for {path} exceeds {MAX_VALUE_SIZE} bytes"
            )));
        }
        if self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists);
        }
        let parent_path = path::parent(path).unwrap_or(path::ROOT);
        let parent = self.nodes.get_mut(parent_path).ok_or(StoreError::NoNode)?;
        if parent.owner.is_some() {
            return Err(StoreError::NoChildrenForEphemerals);
        }
        parent.children.push(path::name(path).to_owned());
        self.nodes.insert(path.to_owned(), Node::new(value, owner, acl));
        self.fire(events, parent_path, WatchKind::ChildrenChanged);
        Ok(())
    }

    fn remove(
        &mut self,
        events: &broadcast::Sender<WatchEvent>,
        path: &str,
    ) -> Result<(), StoreError> {
        if path == path::ROOT {
            return Err(bad_arguments("cannot delete the root node".into()));
        }
        let node = self.nodes.get(path).ok_or(StoreError::NoNode)?;
        if !node.children.is_empty() {
            return Err(StoreError::Other {
                code: ZNOTEMPTY,
                message: "not empty".into(),
            });
        }
        self.nodes.remove(path);
        let parent_path = path::parent(path).unwrap_or(path::ROOT);
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            let name = path::name(path);
            parent.children.retain(|child| child != name);
        }
        self.fire(events, path, WatchKind::Deleted);
        self.fire(events, parent_path, WatchKind::ChildrenChanged);
        Ok(())
    }
}

fn bad_arguments(message: String) -> StoreError {
    StoreError::Other {
        code: ZBADARGUMENTS,
        message,
    }
}

/// Shared in-memory coordination tree.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a tree containing only the root node.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(path::ROOT.to_owned(), Node::new(None, None, Acl::OpenUnsafe));
        let (events, _) = broadcast::channel(WATCH_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes,
                data_watches: HashSet::new(),
                child_watches: HashSet::new(),
                faults: HashMap::new(),
                calls: HashMap::new(),
                expired: HashSet::new(),
                next_session: 1,
            })),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Open a new session against this tree.
    pub fn session(&self) -> MemorySession {
        let mut guard = self.lock();
        let id = guard.next_session;
        guard.next_session += 1;
        MemorySession {
            store: self.clone(),
            id,
        }
    }

    /// End session `id`: its ephemeral nodes are removed and every further
    /// call through it fails with [`StoreError::SessionExpired`].
    pub fn expire_session(&self, id: u64) {
        let mut guard = self.lock();
        if !guard.expired.insert(id) {
            return;
        }
        let owned: Vec<String> = guard
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(id))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &owned {
            // ephemerals never have children, removal cannot fail
            let _ = guard.remove(&self.events, path);
        }
        warn!(
            target: STORE_DIAGNOSTICS_TARGET,
            session = id,
            removed = owned.len(),
            "session expired"
        );
    }

    /// Subscribe to fired watch notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Create `path` as a persistent node holding `value`, creating missing
    /// ancestors, or overwrite its value if it exists.
    pub fn put(&self, path: &str, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        let mut guard = self.lock();
        for ancestor in path::ancestors(path) {
            match guard.insert(&self.events, ancestor, None, None, Acl::OpenUnsafe) {
                Ok(()) | Err(StoreError::NodeExists) => {}
                Err(err) => return Err(err),
            }
        }
        let value = value.into();
        let created = guard.insert(&self.events, path, Some(value.clone()), None, Acl::OpenUnsafe);
        drop(guard);
        match created {
            Err(StoreError::NodeExists) => self.set_data(path, value),
            other => other,
        }
    }

    /// Overwrite the value of an existing node.
    pub fn set_data(&self, path: &str, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        let value = value.into();
        let mut guard = self.lock();
        if value.len() > MAX_VALUE_SIZE {
            return Err(bad_arguments(format!(
                "value for {path} exceeds {MAX_VALUE_SIZE} bytes"
            )));
        }
        let node = guard.nodes.get_mut(path).ok_or(StoreError::NoNode)?;
        node.value = Some(value);
        guard.fire(&self.events, path, WatchKind::DataChanged);
        Ok(())
    }

    /// Delete a node without children.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.lock().remove(&self.events, path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    /// Current value of `path`; `None` if the node is absent, an empty vector
    /// if it carries no data.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .nodes
            .get(path)
            .map(|node| node.value.clone().unwrap_or_default())
    }

    pub fn is_ephemeral(&self, path: &str) -> bool {
        self.lock()
            .nodes
            .get(path)
            .is_some_and(|node| node.owner.is_some())
    }

    /// ACL the node was created with.
    pub fn acl(&self, path: &str) -> Option<Acl> {
        self.lock().nodes.get(path).map(|node| node.acl)
    }

    /// Whether a data watch is currently armed on `path`.
    pub fn data_watch_armed(&self, path: &str) -> bool {
        self.lock().data_watches.contains(path)
    }

    /// Whether a child watch is currently armed on `path`.
    pub fn child_watch_armed(&self, path: &str) -> bool {
        self.lock().child_watches.contains(path)
    }

    /// Number of handle calls of kind `op` received so far, across sessions.
    pub fn calls(&self, op: Operation) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Make the next call of kind `op` fail with `err`. Faults queue up and
    /// are consumed in order.
    pub fn fail_next(&self, op: Operation, err: StoreError) {
        self.lock().faults.entry(op).or_default().push_back(err);
    }

    /// Common preamble of every handle call.
    fn begin(
        &self,
        session: u64,
        op: Operation,
        path: &str,
    ) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        let mut guard = self.lock();
        *guard.calls.entry(op).or_default() += 1;
        if guard.expired.contains(&session) {
            return Err(StoreError::SessionExpired);
        }
        if let Some(err) = guard.take_fault(op) {
            warn!(
                target: STORE_DIAGNOSTICS_TARGET,
                session,
                ?op,
                path,
                error = %err,
                "injected fault"
            );
            return Err(err);
        }
        Ok(guard)
    }
}

/// A session on a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemorySession {
    store: MemoryStore,
    id: u64,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The tree this session is connected to.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Close the session, removing its ephemeral nodes.
    pub fn close(&self) {
        self.store.expire_session(self.id);
    }
}

#[async_trait]
impl CoordinationHandle for MemorySession {
    async fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let mut guard = self.store.begin(self.id, Operation::GetData, path)?;
        let value = guard
            .nodes
            .get(path)
            .ok_or(StoreError::NoNode)?
            .value
            .clone();
        if watch {
            guard.data_watches.insert(path.to_owned());
        }
        Ok(value)
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
        let mut guard = self.store.begin(self.id, Operation::GetChildren, path)?;
        let children = guard
            .nodes
            .get(path)
            .ok_or(StoreError::NoNode)?
            .children
            .clone();
        if watch {
            guard.child_watches.insert(path.to_owned());
        }
        Ok(children)
    }

    async fn create(
        &self,
        path: &str,
        value: &[u8],
        acl: Acl,
        mode: CreateMode,
    ) -> Result<(), StoreError> {
        let mut guard = self.store.begin(self.id, Operation::Create, path)?;
        let owner = mode.is_ephemeral().then_some(self.id);
        // zero-length creates store no data, like a null buffer
        let value = (!value.is_empty()).then(|| value.to_vec());
        guard.insert(&self.store.events, path, value, owner, acl)
    }
}
