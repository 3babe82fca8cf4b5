//! # storebridge - Inspector Bridge for Reactive Stores
//!
//! storebridge lets an external inspector (a devtools panel) watch the state
//! of an application built from reactive stores grouped under a tree of
//! contexts, and write snapshots back into it.
//!
//! ## Core Concepts
//!
//! - **Context**: a node in the host's component tree that owns stores
//! - **Store**: a unit of observable application state
//! - **State tree**: the nested JSON view of every context and its stores
//! - **Filter**: a dotted path pattern with `*` wildcards selecting parts of the tree
//! - **Change bridge**: forwards each host mutation with the filtered state after it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use storebridge::{channel, BridgeConfig, ChangeBridge, ContextRelation, InMemoryHost};
//!
//! let host = InMemoryHost::new();
//! host.add_context("c1", ContextRelation::new("Counter").with_parent("root"))?;
//! let counter = host.add_store("c1", "s1", json!({"count": 1}))?;
//!
//! let (sink, stream) = channel(64);
//! let bridge = ChangeBridge::for_host(&host, Arc::new(sink), BridgeConfig::default())?;
//! bridge.attach(Some(vec!["*.stores.*".to_string()]));
//!
//! counter.set("count", json!(2));
//! let record = stream.recv()?;
//! assert_eq!(record.state_for("*.stores.*"), Some(&json!({"c1": {"stores": {"s1": {"count": 2}}}})));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod path;
pub mod registry;

// State tree and its views
pub mod filter;
pub mod projection;
pub mod resolver;
pub mod tree;

// Inspector integration
pub mod bridge;
pub mod config;
pub mod restore;

// Re-export primary types at crate root for convenience
pub use bridge::{
    channel, BridgeStats, ChangeBridge, ChannelSink, CommandOutcome, InspectorCommand, InspectorSink,
    InspectorStream, OutboundMessage, SessionId,
};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, PathError, RegistryError, ResolveError};
pub use event::{MutationEvent, MutationKind};
pub use filter::{expand, FilterPattern};
pub use projection::{project, project_filter, project_segments, FilteredState};
pub use registry::{
    ContextRelation, InMemoryHost, MutationSource, ObservableStore, RelationRegistry, Serializable, Store,
    StoreRegistry, Transactor,
};
pub use resolver::ContextKeyResolver;
pub use restore::{RestoreReport, SkipReason, SkippedStore, StateRestorer};
pub use tree::{StateTree, StateTreeBuilder};
