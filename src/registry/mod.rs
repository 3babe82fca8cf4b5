//! Host collaborators: the traits the bridge consumes and in-memory
//! implementations of them.

pub mod memory;
mod traits;

pub use memory::{
    InMemoryHost, InMemoryRelationRegistry, InMemoryStoreRegistry, MutationBus, ObservableStore,
};
pub use traits::{
    store_state, ContextRelation, Listener, ListenerId, MutationSource, RelationRegistry,
    Serializable, Store, StoreRegistry, Transactor, ROOT_CONTEXT,
};
