//! Declared and bound component access.

use std::any::{type_name, Any, TypeId};

use indexmap::IndexMap;

use crate::ecs::{Component, ComponentInfo, ReadStore, Registry, WriteStore};
use crate::error::{EcsError, EcsResult};

/// The component types a system reads and writes.
///
/// A type is either a read or a write, never both: a writer already reads
/// its own store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessDescriptor {
    reads: Vec<ComponentInfo>,
    writes: Vec<ComponentInfo>,
}

impl AccessDescriptor {
    /// Builds a descriptor, dropping duplicates.
    ///
    /// # Errors
    ///
    /// `InvalidAccess` if a type is both read and written.
    pub fn new(
        system: &str,
        reads: impl IntoIterator<Item = ComponentInfo>,
        writes: impl IntoIterator<Item = ComponentInfo>,
    ) -> EcsResult<Self> {
        let mut descriptor = Self::default();
        for info in reads {
            if !descriptor.reads.contains(&info) {
                descriptor.reads.push(info);
            }
        }
        for info in writes {
            if descriptor.reads.contains(&info) {
                return Err(EcsError::InvalidAccess {
                    system: system.to_string(),
                    component: info.name(),
                });
            }
            if !descriptor.writes.contains(&info) {
                descriptor.writes.push(info);
            }
        }
        Ok(descriptor)
    }

    /// Types read, in declaration order.
    #[must_use]
    pub fn reads(&self) -> &[ComponentInfo] {
        &self.reads
    }

    /// Types written, in declaration order.
    #[must_use]
    pub fn writes(&self) -> &[ComponentInfo] {
        &self.writes
    }

    /// Whether `type_id` is a declared read.
    #[must_use]
    pub fn reads_type(&self, type_id: TypeId) -> bool {
        self.reads.iter().any(|info| info.id() == type_id)
    }

    /// Whether `type_id` is a declared write.
    #[must_use]
    pub fn writes_type(&self, type_id: TypeId) -> bool {
        self.writes.iter().any(|info| info.id() == type_id)
    }

    /// The first type both descriptors write, if any.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> Option<ComponentInfo> {
        self.writes
            .iter()
            .copied()
            .find(|info| other.writes.contains(info))
    }
}

type Bound = Box<dyn Any + Send + Sync>;

/// Binds the store handle for one declared type.
pub(crate) type Binder = fn(&mut Registry) -> Bound;

pub(crate) fn bind_read<C: Component>(registry: &mut Registry) -> Bound {
    Box::new(registry.read_store::<C>())
}

pub(crate) fn bind_write<C: Component>(registry: &mut Registry) -> Bound {
    Box::new(registry.write_store::<C>())
}

/// Store handles bound for exactly the types a system declared.
///
/// Inputs come back as [`ReadStore`]s, which expose no mutation; outputs as
/// [`WriteStore`]s.
pub struct SystemAccess {
    system: String,
    reads: IndexMap<TypeId, Bound>,
    writes: IndexMap<TypeId, Bound>,
}

impl SystemAccess {
    pub(crate) fn bind(
        system: &str,
        registry: &mut Registry,
        reads: &[(ComponentInfo, Binder)],
        writes: &[(ComponentInfo, Binder)],
    ) -> Self {
        let mut bind_all = |declared: &[(ComponentInfo, Binder)]| {
            declared
                .iter()
                .map(|(info, binder)| (info.id(), binder(registry)))
                .collect::<IndexMap<_, _>>()
        };
        let reads = bind_all(reads);
        let writes = bind_all(writes);

        Self {
            system: system.to_string(),
            reads,
            writes,
        }
    }

    /// The read handle for `C`.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not a declared read of this system.
    #[must_use]
    pub fn read<C: Component>(&self) -> &ReadStore<C> {
        self.reads
            .get(&TypeId::of::<C>())
            .and_then(|bound| bound.downcast_ref::<ReadStore<C>>())
            .unwrap_or_else(|| {
                panic!(
                    "precondition violated: system {} reads undeclared component {}",
                    self.system,
                    type_name::<C>()
                )
            })
    }

    /// The write handle for `C`.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not a declared write of this system.
    #[must_use]
    pub fn write<C: Component>(&self) -> &WriteStore<C> {
        self.writes
            .get(&TypeId::of::<C>())
            .and_then(|bound| bound.downcast_ref::<WriteStore<C>>())
            .unwrap_or_else(|| {
                panic!(
                    "precondition violated: system {} writes undeclared component {}",
                    self.system,
                    type_name::<C>()
                )
            })
    }
}

impl std::fmt::Debug for SystemAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAccess")
            .field("system", &self.system)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .finish()
    }
}
