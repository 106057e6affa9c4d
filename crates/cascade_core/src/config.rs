//! # Engine Configuration
//!
//! Loaded once at startup from a TOML file. Every field has a default, so
//! an empty document is a valid configuration.
//!
//! ```toml
//! initial_entities = 1024
//! store_capacity = 256
//! log_change_events = false
//! warn_on_late_reads = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Configuration for a [`crate::ecs::Registry`] and its schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Entity slots reserved up front.
    pub initial_entities: usize,
    /// Values reserved up front in each newly created store.
    pub store_capacity: usize,
    /// Emit a `trace!` line for every change event.
    pub log_change_events: bool,
    /// Warn when a system reads a component written by a later system
    /// (the value only becomes visible on the next frame).
    pub warn_on_late_reads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_entities: 1024,
            store_capacity: 256,
            log_change_events: false,
            warn_on_late_reads: true,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the text is not valid TOML or has unknown keys.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str("log_change_events = true\nstore_capacity = 8").unwrap();
        assert!(config.log_change_events);
        assert_eq!(config.store_capacity, 8);
        assert_eq!(config.initial_entities, 1024);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineConfig::from_toml_str("frame_budget = 3").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/nonexistent/cascade.toml").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(msg) if msg.contains("cascade.toml")));
    }
}
