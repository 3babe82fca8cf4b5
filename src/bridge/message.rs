//! Records sent to the inspector.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::MutationEvent;
use crate::projection::FilteredState;

/// Identifies one attach of a [`super::ChangeBridge`].
///
/// Every call to `attach` mints a new id, so an inspector can tell records
/// of a torn-down subscription from those of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One forwarded mutation together with the filtered state after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// The mutation as the host reported it.
    pub event: MutationEvent,
    /// One entry per active filter, in subscription order.
    pub stores_state: Vec<FilteredState>,
    /// Attach this record belongs to.
    pub session_id: SessionId,
    /// When the bridge produced the record.
    pub emitted_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// The projected value reported for `filter`, if it is subscribed.
    #[must_use]
    pub fn state_for(&self, filter: &str) -> Option<&serde_json::Value> {
        self.stores_state
            .iter()
            .find(|entry| entry.path == filter)
            .map(|entry| &entry.value)
    }
}
