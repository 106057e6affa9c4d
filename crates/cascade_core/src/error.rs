//! # Core Error Types
//!
//! Recoverable failures of the store, registry and schedule contracts.
//!
//! Programming errors (reading a declared component that is absent, touching
//! a component type a system never declared, reading an uninitialised context
//! slot) are not represented here: they panic at the call site.

use thiserror::Error;

use crate::ecs::EntityId;

/// Errors that can occur in the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity does not hold the requested component.
    #[error("entity {entity} has no component {component}")]
    NotFound {
        /// The entity that was queried.
        entity: EntityId,
        /// Name of the component type.
        component: &'static str,
    },

    /// Raw insertion on an entity that already holds the component.
    #[error("entity {entity} already has component {component}")]
    AlreadyExists {
        /// The entity that was written.
        entity: EntityId,
        /// Name of the component type.
        component: &'static str,
    },

    /// The entity handle is dead or stale.
    #[error("entity {0:?} is not alive")]
    EntityNotAlive(EntityId),

    /// Two systems in one schedule declare a write of the same component.
    #[error("component {component} is written by both {existing} and {incoming}")]
    WriteConflict {
        /// Name of the component type.
        component: &'static str,
        /// The system already registered as its writer.
        existing: String,
        /// The system that was rejected.
        incoming: String,
    },

    /// A system declaration is inconsistent.
    #[error("invalid access in system {system}: {component}")]
    InvalidAccess {
        /// Name of the system.
        system: String,
        /// Name of the offending component type.
        component: &'static str,
    },

    /// A system was built without anything to watch.
    #[error("system {0} watches no component")]
    EmptyWatch(String),

    /// A system watches more matchers than one observer can track.
    #[error("system {system} watches {count} matchers, at most {max} supported")]
    TooManyMatchers {
        /// Name of the system.
        system: String,
        /// Matchers declared.
        count: usize,
        /// The observer limit.
        max: usize,
    },

    /// A system's update failed part way through its dirty set.
    #[error("system {system} failed: {reason}")]
    SystemFailed {
        /// Name of the system.
        system: String,
        /// Human-readable cause.
        reason: String,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_component() {
        let err = EcsError::NotFound {
            entity: EntityId::new(3, 1),
            component: "C1",
        };
        assert_eq!(err.to_string(), "entity 3 has no component C1");

        let err = EcsError::WriteConflict {
            component: "C2",
            existing: "system_a".to_string(),
            incoming: "system_x".to_string(),
        };
        assert!(err.to_string().contains("system_a"));
        assert!(err.to_string().contains("system_x"));
    }
}
