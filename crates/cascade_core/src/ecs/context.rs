//! # Context Table
//!
//! Registry-scoped side-channel storage, one slot per key type.
//!
//! Slots are never created on demand: a slot must be `emplace`d before the
//! first `get`, and reading an uninitialised slot is a programming error.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

/// Keyed storage attached to a [`crate::ecs::Registry`].
#[derive(Default)]
pub struct ContextTable {
    slots: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ContextTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialises the slot for `K`, replacing any previous value.
    pub fn emplace<K: Any + Send + Sync>(&mut self, value: K) -> &mut K {
        self.slots.insert(TypeId::of::<K>(), Box::new(value));
        self.get_mut::<K>()
    }

    /// Reads the slot for `K`.
    ///
    /// # Panics
    ///
    /// Panics if the slot was never initialised.
    #[must_use]
    pub fn get<K: Any + Send + Sync>(&self) -> &K {
        self.try_get::<K>().unwrap_or_else(|| {
            panic!(
                "precondition violated: context slot {} read before emplace",
                type_name::<K>()
            )
        })
    }

    /// Mutably reads the slot for `K`.
    ///
    /// # Panics
    ///
    /// Panics if the slot was never initialised.
    pub fn get_mut<K: Any + Send + Sync>(&mut self) -> &mut K {
        self.slots
            .get_mut(&TypeId::of::<K>())
            .and_then(|slot| slot.downcast_mut::<K>())
            .unwrap_or_else(|| {
                panic!(
                    "precondition violated: context slot {} read before emplace",
                    type_name::<K>()
                )
            })
    }

    /// Reads the slot for `K`, or `None` if uninitialised.
    #[must_use]
    pub fn try_get<K: Any + Send + Sync>(&self) -> Option<&K> {
        self.slots
            .get(&TypeId::of::<K>())
            .and_then(|slot| slot.downcast_ref::<K>())
    }

    /// Whether the slot for `K` is initialised.
    #[must_use]
    pub fn contains<K: Any + Send + Sync>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<K>())
    }

    /// Takes the value out of the slot for `K`.
    pub fn remove<K: Any + Send + Sync>(&mut self) -> Option<K> {
        self.slots
            .remove(&TypeId::of::<K>())
            .and_then(|slot| slot.downcast::<K>().ok())
            .map(|boxed| *boxed)
    }

    /// Number of initialised slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is initialised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for ContextTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextTable")
            .field("slots", &self.slots.len())
            .finish()
    }
}
