//! # Allocator Configuration
//!
//! Per-instance policy knobs. Usually built in code, but can also be loaded
//! from a TOML file once at startup:
//!
//! ```toml
//! exhaustion = "panic"
//! debug_fill = true
//! ```

use crate::error::{AllocError, AllocResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What an allocator does when a request would outgrow its reservation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Return [`AllocError::CapacityExceeded`] for the caller to branch on.
    #[default]
    ReturnError,
    /// Panic with a "reservation exceeded" message.
    Panic,
}

/// Configuration shared by the push arena and the slot allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
    /// Capacity exhaustion behaviour.
    pub exhaustion: ExhaustionPolicy,
    /// Pattern-fill pushed and released bytes to expose stale reads.
    pub debug_fill: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            exhaustion: ExhaustionPolicy::ReturnError,
            debug_fill: cfg!(debug_assertions),
        }
    }
}

impl AllocatorConfig {
    /// Returns a copy with the given exhaustion policy.
    #[must_use]
    pub const fn with_exhaustion(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// Returns a copy with debug fill switched on or off.
    #[must_use]
    pub const fn with_debug_fill(mut self, debug_fill: bool) -> Self {
        self.debug_fill = debug_fill;
        self
    }

    /// Parses a configuration from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if the text is not valid TOML or
    /// contains unknown keys.
    pub fn from_toml_str(text: &str) -> AllocResult<Self> {
        toml::from_str(text).map_err(|e| AllocError::InvalidConfig(e.to_string()))
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> AllocResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AllocError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reports capacity exhaustion according to the policy.
    ///
    /// # Panics
    ///
    /// Panics under [`ExhaustionPolicy::Panic`].
    pub(crate) fn exhausted<T>(&self, requested: usize, capacity: usize) -> AllocResult<T> {
        match self.exhaustion {
            ExhaustionPolicy::ReturnError => {
                tracing::warn!(requested, capacity, "reservation exceeded");
                Err(AllocError::CapacityExceeded { requested, capacity })
            }
            ExhaustionPolicy::Panic => {
                panic!("reservation exceeded: requested {requested}, capacity {capacity}")
            }
        }
    }
}
