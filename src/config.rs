//! Bridge configuration.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::event::MutationKind;
use crate::filter::{FilterPattern, CATCH_ALL};

fn default_filters() -> Vec<String> {
    vec![CATCH_ALL.to_string()]
}

fn default_excluded_kinds() -> Vec<MutationKind> {
    MutationKind::NOISE.to_vec()
}

const fn default_sink_capacity() -> usize {
    1024
}

/// Configuration for a [`crate::bridge::ChangeBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Filters merged into every subscription set.
    #[serde(default = "default_filters")]
    pub default_filters: Vec<String>,
    /// Event kinds never forwarded to the inspector.
    #[serde(default = "default_excluded_kinds")]
    pub excluded_kinds: Vec<MutationKind>,
    /// Buffer size of the outbound channel created by [`crate::bridge::channel`].
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_filters: default_filters(),
            excluded_kinds: default_excluded_kinds(),
            sink_capacity: default_sink_capacity(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(raw: &str) -> BridgeResult<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|e| BridgeError::config(format!("invalid bridge config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the bridge cannot honor.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.sink_capacity == 0 {
            return Err(BridgeError::config("sink_capacity must be > 0"));
        }
        if let Some(pos) = self.default_filters.iter().position(|f| f.trim().is_empty()) {
            return Err(BridgeError::config(format!("default_filters[{pos}] is empty")));
        }
        for filter in &self.default_filters {
            FilterPattern::parse_strict(filter.as_str())?;
        }
        Ok(())
    }

    /// Replace the default filters.
    #[must_use]
    pub fn with_default_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the excluded event kinds.
    #[must_use]
    pub fn with_excluded_kinds(mut self, kinds: impl IntoIterator<Item = MutationKind>) -> Self {
        self.excluded_kinds = kinds.into_iter().collect();
        self
    }

    /// Set the outbound channel capacity.
    #[must_use]
    pub const fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    /// Returns true if events of `kind` are dropped.
    #[must_use]
    pub fn excludes(&self, kind: MutationKind) -> bool {
        self.excluded_kinds.contains(&kind)
    }
}
