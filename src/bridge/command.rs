//! Inspector-to-bridge commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::projection::FilteredState;
use crate::restore::RestoreReport;

use super::message::SessionId;

/// A request from the inspector.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectorCommand {
    /// (Re)attach with an optional initial filter set.
    Attach {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<Vec<String>>,
    },
    /// Replace the active filter set.
    Subscribe { filters: Vec<String> },
    /// Write a snapshot back into the live stores.
    Restore { snapshot: Value },
    /// Report the current filtered state without waiting for a mutation.
    Refresh,
    /// Stop forwarding mutations.
    Detach,
}

impl InspectorCommand {
    /// Parse a command from its JSON form.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// What a command did.
///
/// Field names are camelCase, like [`OutboundMessage`](super::OutboundMessage).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandOutcome {
    #[serde(rename_all = "camelCase")]
    Attached {
        session_id: SessionId,
        filters: Vec<String>,
    },
    Subscribed {
        filters: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Restored {
        report: RestoreReport,
    },
    #[serde(rename_all = "camelCase")]
    State {
        stores_state: Vec<FilteredState>,
    },
    #[serde(rename_all = "camelCase")]
    Detached {
        was_attached: bool,
    },
}
