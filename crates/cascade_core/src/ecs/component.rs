//! # Component Types
//!
//! Components are plain data records with no behavior. Each type lives in
//! its own store, and is identified at runtime by a [`ComponentInfo`].

use std::any::TypeId;
use std::fmt;

/// Marker trait for components.
///
/// Components must be:
/// - `Clone`: systems copy inputs out of a store before computing
/// - `Send + Sync + 'static`: stores are shared behind `Arc<RwLock<_>>`
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default)]
/// struct Health {
///     v: f32,
/// }
///
/// impl Component for Health {
///     const NAME: &'static str = "Health";
/// }
/// ```
pub trait Component: Clone + Send + Sync + 'static {
    /// Human-readable type name used in diagnostics and error messages.
    const NAME: &'static str;
}

/// Runtime identifier of a component type.
///
/// Equality and hashing only consider the `TypeId`; the name is carried for
/// display.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentInfo {
    /// Returns the identifier of component type `C`.
    #[inline]
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: C::NAME,
        }
    }

    /// The Rust type identifier.
    #[inline]
    #[must_use]
    pub const fn id(self) -> TypeId {
        self.type_id
    }

    /// The component's declared name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentInfo {}

impl std::hash::Hash for ComponentInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
