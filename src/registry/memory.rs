//! In-memory collaborators.
//!
//! Thread-safe implementations of the registry traits plus an observable
//! store and a mutation bus. They are intended for embedded hosts, tests,
//! and as a reference for adapting the bridge to a real reactive runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, ThreadId};

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::RegistryError;
use crate::event::MutationEvent;

use super::traits::{
    ContextRelation, Listener, ListenerId, MutationSource, RelationRegistry, Store, StoreRegistry,
    Transactor,
};

fn lock_err(context: &'static str) -> RegistryError {
    RegistryError::Poisoned { context }
}

/// Dispatches mutation events to listeners and batches atomic writes.
///
/// Batches belong to the thread that opened them. While one thread is inside
/// [`Transactor::run_atomically`], events emitted by other threads are
/// delivered immediately and never folded into its batch.
#[derive(Default)]
pub struct MutationBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    batches: Mutex<HashMap<ThreadId, BatchState>>,
    transactions: AtomicU64,
}

#[derive(Debug, Default)]
struct BatchState {
    depth: usize,
    pending: Vec<MutationEvent>,
}

impl std::fmt::Debug for MutationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationBus")
            .field("listeners", &self.listener_count())
            .field("transactions", &self.transaction_count())
            .finish_non_exhaustive()
    }
}

impl MutationBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event.
    ///
    /// Inside [`Transactor::run_atomically`] on the calling thread the event
    /// is held back and delivered with the rest of that batch.
    pub fn emit(&self, event: MutationEvent) {
        {
            let mut batches = self.batches.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(batch) = batches.get_mut(&thread::current().id()) {
                batch.pending.push(event);
                return;
            }
        }
        self.deliver(&event);
    }

    fn deliver(&self, event: &MutationEvent) {
        // Snapshot the listener list so listeners may (un)subscribe re-entrantly.
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| Arc::clone(l)).collect(),
        };
        trace!(kind = %event.kind(), listeners = listeners.len(), "delivering mutation event");
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of installed listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Number of completed outermost atomic mutations.
    #[must_use]
    pub fn transaction_count(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }
}

impl MutationSource for MutationBus {
    fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        let mut guard = self.listeners.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|(lid, _)| *lid != id);
        guard.len() != before
    }
}

/// Leaves the batch if the closure panics so the bus does not stay batched.
struct BatchGuard<'a> {
    bus: &'a MutationBus,
    armed: bool,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.bus.exit_batch();
        }
    }
}

impl MutationBus {
    fn enter_batch(&self) {
        let mut batches = self.batches.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        batches.entry(thread::current().id()).or_default().depth += 1;
    }

    /// Returns the buffered events when the calling thread's outermost batch closes.
    fn exit_batch(&self) -> Option<Vec<MutationEvent>> {
        let id = thread::current().id();
        let mut batches = self.batches.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let batch = batches.get_mut(&id)?;
        batch.depth = batch.depth.saturating_sub(1);
        if batch.depth > 0 {
            return None;
        }
        batches.remove(&id).map(|batch| batch.pending)
    }
}

impl Transactor for MutationBus {
    fn run_atomically(&self, f: &mut dyn FnMut()) {
        self.enter_batch();
        let mut guard = BatchGuard { bus: self, armed: true };
        f();
        guard.armed = false;

        let Some(changes) = self.exit_batch() else {
            return;
        };
        self.transactions.fetch_add(1, Ordering::Relaxed);

        if !changes.is_empty() {
            self.deliver(&MutationEvent::Batch { changes });
        }
        self.deliver(&MutationEvent::report_end());
    }
}

/// A store holding its fields in a JSON map and reporting writes to a bus.
#[derive(Debug)]
pub struct ObservableStore {
    id: String,
    fields: RwLock<Map<String, Value>>,
    bus: Option<Weak<MutationBus>>,
}

impl ObservableStore {
    /// Creates a store that reports nothing.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields: RwLock::new(fields),
            bus: None,
        }
    }

    /// Creates a store that reports its writes to `bus`.
    ///
    /// Only a weak handle is kept; a bus that has been dropped is ignored.
    #[must_use]
    pub fn observed(id: impl Into<String>, fields: Map<String, Value>, bus: &Arc<MutationBus>) -> Self {
        Self {
            id: id.into(),
            fields: RwLock::new(fields),
            bus: Some(Arc::downgrade(bus)),
        }
    }

    /// Current value of one field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.fields.read() {
            Ok(guard) => guard.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }

    /// Host-side write of a single field.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        let mut one = Map::new();
        one.insert(name.into(), value);
        self.assign(&one);
    }
}

impl Store for ObservableStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn observable_fields(&self) -> Map<String, Value> {
        match self.fields.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn assign(&self, fields: &Map<String, Value>) {
        let mut events = Vec::with_capacity(fields.len());
        {
            let mut guard = self.fields.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            for (name, value) in fields {
                match guard.insert(name.clone(), value.clone()) {
                    Some(old) if old == *value => {}
                    Some(old) => events.push(MutationEvent::update(&self.id, name, old, value.clone())),
                    None => events.push(MutationEvent::Add {
                        store_id: self.id.clone(),
                        field: name.clone(),
                        new_value: value.clone(),
                    }),
                }
            }
        }

        // Lock released before notifying so listeners can read this store.
        if let Some(bus) = self.bus.as_ref().and_then(Weak::upgrade) {
            for event in events {
                bus.emit(event);
            }
        }
    }
}

/// Thread-safe in-memory store registry.
#[derive(Debug)]
pub struct InMemoryStoreRegistry {
    stores: RwLock<HashMap<String, Arc<dyn Store>>>,
    ready: AtomicBool,
}

impl Default for InMemoryStoreRegistry {
    fn default() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
        }
    }
}

impl InMemoryStoreRegistry {
    /// Creates an empty, ready registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that reports `NotReady` until [`Self::mark_ready`].
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Flag the registry as initialized.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Register a store under its own id, replacing any previous entry.
    pub fn insert(&self, store: Arc<dyn Store>) -> Result<(), RegistryError> {
        let mut guard = self.stores.write().map_err(|_| lock_err("stores.write"))?;
        guard.insert(store.id().to_string(), store);
        Ok(())
    }

    /// Drop a store. Returns the removed store, if any.
    pub fn remove(&self, store_id: &str) -> Result<Option<Arc<dyn Store>>, RegistryError> {
        let mut guard = self.stores.write().map_err(|_| lock_err("stores.write"))?;
        Ok(guard.remove(store_id))
    }

    /// Number of registered stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Returns true if no store is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreRegistry for InMemoryStoreRegistry {
    fn get(&self, store_id: &str) -> Result<Option<Arc<dyn Store>>, RegistryError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(RegistryError::NotReady { registry: "stores" });
        }
        let guard = self.stores.read().map_err(|_| lock_err("stores.read"))?;
        Ok(guard.get(store_id).cloned())
    }
}

#[derive(Debug, Default)]
struct RelationState {
    order: Vec<String>,
    by_id: HashMap<String, ContextRelation>,
}

/// Thread-safe in-memory relation registry preserving registration order.
#[derive(Debug)]
pub struct InMemoryRelationRegistry {
    state: RwLock<RelationState>,
    ready: AtomicBool,
}

impl Default for InMemoryRelationRegistry {
    fn default() -> Self {
        Self {
            state: RwLock::new(RelationState::default()),
            ready: AtomicBool::new(true),
        }
    }
}

impl InMemoryRelationRegistry {
    /// Creates an empty, ready registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that reports `NotReady` until [`Self::mark_ready`].
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            state: RwLock::new(RelationState::default()),
            ready: AtomicBool::new(false),
        }
    }

    /// Flag the registry as initialized.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Insert or replace a context. Replacing keeps the original position.
    pub fn insert(&self, context_id: impl Into<String>, relation: ContextRelation) -> Result<(), RegistryError> {
        let context_id = context_id.into();
        let mut state = self.state.write().map_err(|_| lock_err("relations.write"))?;
        if !state.by_id.contains_key(&context_id) {
            state.order.push(context_id.clone());
        }
        state.by_id.insert(context_id, relation);
        Ok(())
    }

    /// Append `store_id` to the stores of an existing context.
    ///
    /// The read and the write happen under one lock, so concurrent calls on
    /// the same context never lose an id. Returns `false` if the context is
    /// unknown.
    pub fn add_store_to(&self, context_id: &str, store_id: impl Into<String>) -> Result<bool, RegistryError> {
        let mut state = self.state.write().map_err(|_| lock_err("relations.write"))?;
        let Some(relation) = state.by_id.get_mut(context_id) else {
            return Ok(false);
        };
        let store_id = store_id.into();
        if !relation.store_ids.contains(&store_id) {
            relation.store_ids.push(store_id);
        }
        Ok(true)
    }

    /// Remove a context (e.g. on unmount).
    pub fn remove(&self, context_id: &str) -> Result<Option<ContextRelation>, RegistryError> {
        let mut state = self.state.write().map_err(|_| lock_err("relations.write"))?;
        let removed = state.by_id.remove(context_id);
        if removed.is_some() {
            state.order.retain(|id| id != context_id);
        }
        Ok(removed)
    }
}

impl RelationRegistry for InMemoryRelationRegistry {
    fn relations(&self) -> Result<Vec<(String, ContextRelation)>, RegistryError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(RegistryError::NotReady { registry: "relations" });
        }
        let state = self.state.read().map_err(|_| lock_err("relations.read"))?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.by_id.get(id).map(|rel| (id.clone(), rel.clone())))
            .collect())
    }

    fn relation(&self, context_id: &str) -> Result<Option<ContextRelation>, RegistryError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(RegistryError::NotReady { registry: "relations" });
        }
        let state = self.state.read().map_err(|_| lock_err("relations.read"))?;
        Ok(state.by_id.get(context_id).cloned())
    }
}

/// All in-memory collaborators wired together.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    pub bus: Arc<MutationBus>,
    pub stores: Arc<InMemoryStoreRegistry>,
    pub relations: Arc<InMemoryRelationRegistry>,
}

impl InMemoryHost {
    /// Creates a ready host with empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host whose registries report `NotReady` until marked ready.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            bus: Arc::new(MutationBus::new()),
            stores: Arc::new(InMemoryStoreRegistry::uninitialized()),
            relations: Arc::new(InMemoryRelationRegistry::uninitialized()),
        }
    }

    /// Flag both registries as initialized.
    pub fn mark_ready(&self) {
        self.stores.mark_ready();
        self.relations.mark_ready();
    }

    /// Register a context.
    pub fn add_context(&self, context_id: impl Into<String>, relation: ContextRelation) -> Result<(), RegistryError> {
        self.relations.insert(context_id, relation)
    }

    /// Create an observed store, register it, and attach it to `context_id`.
    ///
    /// The context must already exist.
    pub fn add_store(
        &self,
        context_id: &str,
        store_id: impl Into<String>,
        fields: Value,
    ) -> Result<Arc<ObservableStore>, RegistryError> {
        let store_id = store_id.into();
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let store = Arc::new(ObservableStore::observed(store_id.clone(), fields, &self.bus));
        if !self.relations.add_store_to(context_id, store_id)? {
            return Err(RegistryError::Backend {
                message: format!("unknown context '{context_id}'"),
            });
        }
        self.stores.insert(Arc::clone(&store) as Arc<dyn Store>)?;
        Ok(store)
    }
}
