//! Collaborator traits consumed by the bridge.
//!
//! The host application owns its stores, their parent/child relations, the
//! stream of mutation notifications and the primitive that batches writes.
//! The bridge only sees them through these traits:
//! - [`StoreRegistry`] resolves a store id to a live store
//! - [`RelationRegistry`] describes which context owns which stores
//! - [`MutationSource`] delivers change notifications
//! - [`Transactor`] runs a batch of writes as one change-notification unit

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::event::MutationEvent;

/// Sentinel id of the implicit top-level context.
pub const ROOT_CONTEXT: &str = "root";

/// Optional capability: a store that knows how to snapshot itself.
pub trait Serializable {
    /// Snapshot of the store's state as the inspector should see it.
    fn snapshot(&self) -> Value;
}

/// A live, uniquely identified mutable state container.
pub trait Store: Send + Sync {
    /// Unique store id.
    fn id(&self) -> &str;

    /// Current observable fields, enumerated generically.
    fn observable_fields(&self) -> Map<String, Value>;

    /// Shallow-merge `fields` into the store.
    ///
    /// Only the given fields are written; fields not present in `fields`
    /// keep their current value. Callers outside of a
    /// [`Transactor::run_atomically`] block bypass the host's batching.
    fn assign(&self, fields: &Map<String, Value>);

    /// The custom snapshot capability, if this store has one.
    fn as_serializable(&self) -> Option<&dyn Serializable> {
        None
    }
}

impl fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("id", &self.id()).finish_non_exhaustive()
    }
}

/// State of `store` as recorded in the state tree.
///
/// Prefers the store's own snapshot and falls back to its observable fields.
#[must_use]
pub fn store_state(store: &dyn Store) -> Value {
    match store.as_serializable() {
        Some(custom) => custom.snapshot(),
        None => Value::Object(store.observable_fields()),
    }
}

/// Registry of live stores keyed by id.
pub trait StoreRegistry: Send + Sync {
    /// Look up a store. `Ok(None)` means the store no longer exists.
    fn get(&self, store_id: &str) -> Result<Option<Arc<dyn Store>>, RegistryError>;
}

/// Relation entry for one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRelation {
    /// Parent context id; `None` or [`ROOT_CONTEXT`] means top-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Human-readable label, usually the component name.
    pub display_name: String,
    /// Stores owned directly by this context, in registration order.
    #[serde(default)]
    pub store_ids: Vec<String>,
}

impl ContextRelation {
    /// Creates a top-level relation.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            display_name: display_name.into(),
            store_ids: Vec::new(),
        }
    }

    /// Sets the parent context.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Adds an owned store id, ignoring duplicates.
    #[must_use]
    pub fn with_store(mut self, store_id: impl Into<String>) -> Self {
        let store_id = store_id.into();
        if !self.store_ids.contains(&store_id) {
            self.store_ids.push(store_id);
        }
        self
    }

    /// The parent id, unless this context hangs directly off the root.
    #[must_use]
    pub fn non_root_parent(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .filter(|parent| *parent != ROOT_CONTEXT)
    }
}

/// Registry describing the context forest.
pub trait RelationRegistry: Send + Sync {
    /// All known contexts, in registration order.
    fn relations(&self) -> Result<Vec<(String, ContextRelation)>, RegistryError>;

    /// Relation entry of a single context.
    fn relation(&self, context_id: &str) -> Result<Option<ContextRelation>, RegistryError>;
}

/// Callback invoked for every mutation event.
pub type Listener = Arc<dyn Fn(&MutationEvent) + Send + Sync>;

/// Handle returned by [`MutationSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of mutation notifications.
///
/// Events are delivered synchronously, in emission order.
pub trait MutationSource: Send + Sync {
    /// Install a listener.
    fn subscribe(&self, listener: Listener) -> ListenerId;

    /// Remove a listener. Returns false if it was not installed.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Runs a batch of store writes as one atomic change-notification unit.
pub trait Transactor: Send + Sync {
    /// Execute `f`; observers are notified once after it returns.
    fn run_atomically(&self, f: &mut dyn FnMut());
}
