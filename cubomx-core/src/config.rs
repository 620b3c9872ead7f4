//! Runtime configuration.
//!
//! The declarative attribute surface is fixed by convention, but every
//! prefix and marker name can be overridden. Configuration deserializes from
//! JSON with every field optional:
//!
//! ```rust,ignore
//! let config = Config::from_json(r#"{ "prefixes": { "event": "x-on:" } }"#)?;
//! let runtime = Runtime::with_config(document, config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Attribute prefixes for the binding and event directive families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefixes {
    /// Short component-scope bind prefix (`:text="n"`).
    pub bind: String,
    /// Explicit component-scope bind prefix (`mx-bind:text="n"`).
    pub bind_word: String,
    /// Short item-scope bind prefix (`::text="name"`).
    pub item_bind: String,
    /// Explicit item-scope bind prefix (`mx-item:text="name"`).
    pub item_bind_word: String,
    /// Short event prefix (`@click="save()"`).
    pub event: String,
    /// Explicit event prefix (`mx-on:click="save()"`).
    pub event_word: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            bind: ":".into(),
            bind_word: "mx-bind:".into(),
            item_bind: "::".into(),
            item_bind_word: "mx-item:".into(),
            event: "@".into(),
            event_word: "mx-on:".into(),
        }
    }
}

/// Names of the marker attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub data: String,
    pub reference: String,
    pub item: String,
    pub show: String,
    pub cloak: String,
    pub transition: String,
    pub link: String,
    pub load: String,
    pub target: String,
    pub select: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            data: "mx-data".into(),
            reference: "mx-ref".into(),
            item: "mx-item".into(),
            show: "mx-show".into(),
            cloak: "mx-cloak".into(),
            transition: "mx-transition".into(),
            link: "mx-link".into(),
            load: "mx-load".into(),
            target: "mx-target".into(),
            select: "mx-select".into(),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prefixes: Prefixes,
    pub markers: Markers,
    /// Identifier expressions use to reach named instances (`CuboMX.c.n`).
    pub global_name: String,
    /// Added to an element's transition duration before a visibility
    /// transition settles without a `transitionend` event.
    pub transition_buffer_ms: u64,
    /// Swap target used by links without `mx-target`.
    pub default_link_target: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefixes: Prefixes::default(),
            markers: Markers::default(),
            global_name: "CuboMX".into(),
            transition_buffer_ms: 50,
            default_link_target: "body:innerHTML".into(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn transition_buffer(&self) -> Duration {
        Duration::from_millis(self.transition_buffer_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.prefixes.bind, ":");
        assert_eq!(config.prefixes.item_bind, "::");
        assert_eq!(config.markers.data, "mx-data");
        assert_eq!(config.global_name, "CuboMX");
        assert_eq!(config.transition_buffer(), Duration::from_millis(50));
    }

    #[test]
    fn config_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "prefixes": { "event": "x-on:" }, "transition_buffer_ms": 10 }"#)
            .unwrap();
        assert_eq!(config.prefixes.event, "x-on:");
        assert_eq!(config.prefixes.bind, ":");
        assert_eq!(config.transition_buffer_ms, 10);
    }

    #[test]
    fn config_rejects_malformed_json() {
        assert!(Config::from_json("{ nope").is_err());
    }
}
