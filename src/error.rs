//! Error types for storebridge.
//!
//! All errors are strongly typed using thiserror. The core flows (tree
//! building, filter expansion, projection, restore and event handling) never
//! surface these to the host application: they degrade to "produce nothing
//! for this branch". Errors exist at the edges, where a caller asked for
//! something explicit and deserves to know it failed.

use thiserror::Error;

/// Errors reported by store and relation registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The host application has not finished initializing its state.
    #[error("Registry not ready: {registry}")]
    NotReady {
        registry: &'static str,
    },

    /// A lock guarding registry state was poisoned.
    #[error("Poisoned lock: {context}")]
    Poisoned {
        context: &'static str,
    },

    /// Backend-specific failure.
    #[error("Registry backend error: {message}")]
    Backend {
        message: String,
    },
}

impl RegistryError {
    /// Returns true if the registry is simply not initialized yet.
    #[must_use]
    pub const fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

/// Errors from resolving a context id to its state tree path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The parent chain of `context_id` loops back on itself.
    #[error("Cyclic parent chain while resolving '{context_id}': {}", chain.join(" -> "))]
    Cycle {
        context_id: String,
        chain: Vec<String>,
    },
}

/// Errors from parsing an explicit state tree path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A bracketed index segment is not a non-negative integer.
    #[error("Invalid index '{segment}' in path '{path}'")]
    InvalidIndex {
        path: String,
        segment: String,
    },

    /// A `[` was opened but never closed.
    #[error("Unterminated bracket in path '{path}'")]
    UnterminatedBracket {
        path: String,
    },
}

/// Top-level error type for storebridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {channel}")]
    Disconnected {
        channel: String,
    },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
    },
}

impl BridgeError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a registry error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns true if a filter or path could not be parsed.
    #[must_use]
    pub const fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Returns true if a channel endpoint has gone away.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if retrying the same call later may succeed.
    ///
    /// A registry that is still starting up, or a receive that timed out.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Registry(RegistryError::NotReady { .. }) | Self::Timeout { .. }
        )
    }
}

/// Result type alias for storebridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
