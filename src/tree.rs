//! State tree assembly.
//!
//! The tree is derived, never persisted: every call to
//! [`StateTreeBuilder::build`] re-reads both registries, so its shape always
//! reflects the live context forest.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::path::{self, Segment};
use crate::registry::{store_state, RelationRegistry, StoreRegistry, ROOT_CONTEXT};
use crate::resolver::ContextKeyResolver;

/// Key under which a context node stores its display name.
pub const COMPONENT_NAME_KEY: &str = "componentName";
/// Key under which a context node stores its stores' state.
pub const STORES_KEY: &str = "stores";

/// Snapshot of every context and the stores it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateTree(Value);

impl Default for StateTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl StateTree {
    /// `{ "root": {} }`.
    #[must_use]
    pub fn empty() -> Self {
        let mut top = Map::new();
        top.insert(ROOT_CONTEXT.to_string(), Value::Object(Map::new()));
        Self(Value::Object(top))
    }

    /// Wrap an already assembled tree value.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The node under `root`; filters and restores are relative to it.
    #[must_use]
    pub fn root(&self) -> &Value {
        static EMPTY: Value = Value::Null;
        self.0.get(ROOT_CONTEXT).unwrap_or(&EMPTY)
    }

    /// Returns true if no context contributed any store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self.root() {
            Value::Object(map) => map.is_empty(),
            _ => true,
        }
    }

    /// The whole tree, including the `root` wrapper.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the tree and return its JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Builds [`StateTree`]s from the host registries.
#[derive(Clone, Copy)]
pub struct StateTreeBuilder<'a> {
    stores: &'a dyn StoreRegistry,
    relations: &'a dyn RelationRegistry,
}

impl<'a> StateTreeBuilder<'a> {
    /// Builder reading the given registries.
    #[must_use]
    pub fn new(stores: &'a dyn StoreRegistry, relations: &'a dyn RelationRegistry) -> Self {
        Self { stores, relations }
    }

    /// Assemble the current tree.
    ///
    /// Never fails: registries that are not ready yield the empty tree,
    /// stores that vanished are skipped, and contexts with a cyclic parent
    /// chain are left out.
    #[must_use]
    pub fn build(&self) -> StateTree {
        match self.try_build() {
            Ok(tree) => tree,
            Err(e) if e.is_not_ready() => {
                debug!(error = %e, "registries not ready, reporting empty state tree");
                StateTree::empty()
            }
            Err(e) => {
                warn!(error = %e, "state tree build failed, reporting empty state tree");
                StateTree::empty()
            }
        }
    }

    fn try_build(&self) -> Result<StateTree, RegistryError> {
        let resolver = ContextKeyResolver::new(self.relations);
        let mut tree = StateTree::empty();

        for (context_id, relation) in self.relations.relations()? {
            let key = match resolver.resolve_segments(&context_id) {
                Ok(segments) => segments,
                Err(e) => {
                    warn!(context_id = %context_id, error = %e, "skipping context");
                    continue;
                }
            };
            let node: Vec<Segment> = key.into_iter().map(Segment::Key).collect();

            for store_id in &relation.store_ids {
                let Some(store) = self.stores.get(store_id)? else {
                    debug!(context_id = %context_id, store_id = %store_id, "store disposed, skipping");
                    continue;
                };

                let mut store_path = node.clone();
                store_path.push(Segment::Key(STORES_KEY.to_string()));
                store_path.push(Segment::Key(store_id.clone()));
                path::set(&mut tree.0, &store_path, store_state(store.as_ref()));

                let mut name_path = node.clone();
                name_path.push(Segment::Key(COMPONENT_NAME_KEY.to_string()));
                path::set(&mut tree.0, &name_path, Value::String(relation.display_name.clone()));
            }
        }

        Ok(tree)
    }
}
