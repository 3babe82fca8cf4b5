//! Mutation events emitted by the host's reactive runtime.
//!
//! These types are serializable so they can be handed to an inspector
//! transport as-is.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single observable change in the host application.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MutationEvent {
    /// An existing field was overwritten.
    #[serde(rename_all = "camelCase")]
    Update {
        store_id: String,
        field: String,
        #[serde(default)]
        old_value: Value,
        new_value: Value,
    },

    /// A field was added to a store or a keyed collection.
    #[serde(rename_all = "camelCase")]
    Add {
        store_id: String,
        field: String,
        new_value: Value,
    },

    /// A field was removed.
    #[serde(rename_all = "camelCase")]
    Delete {
        store_id: String,
        field: String,
        #[serde(default)]
        old_value: Value,
    },

    /// An array field had elements inserted or removed.
    #[serde(rename_all = "camelCase")]
    Splice {
        store_id: String,
        field: String,
        index: usize,
        #[serde(default)]
        removed: Vec<Value>,
        #[serde(default)]
        added: Vec<Value>,
    },

    /// A store or observable value was created.
    #[serde(rename_all = "camelCase")]
    Create {
        store_id: String,
        #[serde(default)]
        new_value: Value,
    },

    /// A named action was invoked.
    #[serde(rename_all = "camelCase")]
    Action {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Value>,
    },

    /// Writes made inside one atomic mutation, delivered together.
    Batch {
        changes: Vec<MutationEvent>,
    },

    /// A derived value was recomputed.
    Reaction {
        name: String,
    },

    /// End of a multi-step update.
    #[serde(rename_all = "camelCase")]
    ReportEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_ms: Option<u64>,
    },

    /// The host reported an error while applying a change.
    Error {
        message: String,
    },
}

/// Discriminant of a [`MutationEvent`], used for filtering.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    Update,
    Add,
    Delete,
    Splice,
    Create,
    Action,
    Batch,
    Reaction,
    ReportEnd,
    Error,
}

impl MutationKind {
    /// Kinds that are noise for a human inspector and dropped by default.
    pub const NOISE: [Self; 2] = [Self::ReportEnd, Self::Reaction];

    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Splice => "splice",
            Self::Create => "create",
            Self::Action => "action",
            Self::Batch => "batch",
            Self::Reaction => "reaction",
            Self::ReportEnd => "report-end",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MutationEvent {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Update { .. } => MutationKind::Update,
            Self::Add { .. } => MutationKind::Add,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Splice { .. } => MutationKind::Splice,
            Self::Create { .. } => MutationKind::Create,
            Self::Action { .. } => MutationKind::Action,
            Self::Batch { .. } => MutationKind::Batch,
            Self::Reaction { .. } => MutationKind::Reaction,
            Self::ReportEnd { .. } => MutationKind::ReportEnd,
            Self::Error { .. } => MutationKind::Error,
        }
    }

    /// The store this event is about, when it concerns a single store.
    #[must_use]
    pub fn store_id(&self) -> Option<&str> {
        match self {
            Self::Update { store_id, .. }
            | Self::Add { store_id, .. }
            | Self::Delete { store_id, .. }
            | Self::Splice { store_id, .. }
            | Self::Create { store_id, .. } => Some(store_id),
            Self::Action { store_id, .. } => store_id.as_deref(),
            Self::Batch { .. } | Self::Reaction { .. } | Self::ReportEnd { .. } | Self::Error { .. } => {
                None
            }
        }
    }

    /// Creates an update event.
    #[must_use]
    pub fn update(store_id: impl Into<String>, field: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self::Update {
            store_id: store_id.into(),
            field: field.into(),
            old_value,
            new_value,
        }
    }

    /// Creates an action event without arguments.
    #[must_use]
    pub fn action(name: impl Into<String>) -> Self {
        Self::Action {
            name: name.into(),
            store_id: None,
            arguments: Vec::new(),
        }
    }

    /// Creates a reaction event.
    #[must_use]
    pub fn reaction(name: impl Into<String>) -> Self {
        Self::Reaction { name: name.into() }
    }

    /// Creates an end-of-update marker.
    #[must_use]
    pub const fn report_end() -> Self {
        Self::ReportEnd { time_ms: None }
    }
}
