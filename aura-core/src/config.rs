//! Runtime configuration.
//!
//! Defaults cover the common case; a JSON document can override any subset
//! of fields.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables shared by the runtime, the compiler and the event binder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times one effect may run within a single flush before
    /// further updates to it are dropped.
    pub max_effect_runs: usize,

    /// Event names the binder looks for (`@click`, `@input`, ...).
    pub event_names: Vec<String>,

    /// Attributes rendered as bare presence when their binding is truthy.
    pub boolean_attributes: Vec<String>,

    /// Log a warning when an event attribute names nothing callable.
    pub warn_unresolved_handlers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_effect_runs: 100,
            event_names: ["click", "input", "keydown", "keyup", "change", "submit"]
                .into_iter()
                .map(String::from)
                .collect(),
            boolean_attributes: [
                "checked", "disabled", "selected", "readonly", "required", "hidden", "multiple",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            warn_unresolved_handlers: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::InvalidConfig)
    }

    pub fn is_boolean_attribute(&self, name: &str) -> bool {
        self.boolean_attributes.iter().any(|a| a == name)
    }
}
