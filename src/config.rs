//! Container configuration.
//!
//! Options come from code, from the environment, or (with the `config`
//! feature) from JSON.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::{DiError, DiResult};

/// Environment variable toggling eager singleton instantiation.
pub const ENV_EAGER: &str = "FERROUS_INJECT_EAGER";
/// Environment variable overriding the maximum resolution depth.
pub const ENV_MAX_DEPTH: &str = "FERROUS_INJECT_MAX_DEPTH";

/// Options controlling container bootstrap and resolution.
///
/// # Examples
///
/// ```
/// use ferrous_inject::ContainerOptions;
///
/// let options = ContainerOptions::default().lazy().with_max_resolution_depth(64);
/// assert!(!options.instantiate_eagerly);
/// assert_eq!(options.max_resolution_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Create every static singleton while building the container
    pub instantiate_eagerly: bool,
    /// Longest resolution chain before failing with `DepthExceeded`
    pub max_resolution_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            instantiate_eagerly: true,
            max_resolution_depth: 1024,
        }
    }
}

impl ContainerOptions {
    /// Defer every singleton until first resolution.
    pub fn lazy(mut self) -> Self {
        self.instantiate_eagerly = false;
        self
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Defaults overridden by `FERROUS_INJECT_EAGER` and
    /// `FERROUS_INJECT_MAX_DEPTH` when set.
    pub fn from_env() -> DiResult<Self> {
        let mut options = Self::default();
        if let Ok(value) = env::var(ENV_EAGER) {
            options.instantiate_eagerly = parse_bool(ENV_EAGER, &value)?;
        }
        if let Ok(value) = env::var(ENV_MAX_DEPTH) {
            options.max_resolution_depth = value
                .trim()
                .parse::<usize>()
                .map_err(|e| DiError::msg(format!("invalid {}={:?}: {}", ENV_MAX_DEPTH, value, e)))?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Options from a JSON document; absent fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> DiResult<Self> {
        let options: Self = serde_json::from_str(json).map_err(DiError::custom)?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects a zero resolution depth, which would fail every resolution.
    pub fn validate(&self) -> DiResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(DiError::msg("max_resolution_depth must be at least 1"));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> DiResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DiError::msg(format!("invalid {}={:?}: expected a boolean", key, other))),
    }
}
