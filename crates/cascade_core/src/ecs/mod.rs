//! # Entity Component System
//!
//! Sparse-set component stores that announce every change, and observers
//! that turn those announcements into per-system dirty sets.
//!
//! ## Design Philosophy
//!
//! - One store per component type, created on first use
//! - Every mutation raises exactly one construct/update/destroy event
//! - Entity IDs are indices with generation counters
//! - Work is driven by what changed, never by scanning every entity

mod component;
mod context;
mod entity;
pub mod event;
pub mod observer;
mod registry;
mod storage;

pub use component::{Component, ComponentInfo};
pub use context::ContextTable;
pub use entity::{EntityAllocator, EntityId};
pub use event::{ChangeEvent, ChangeKind, ChangeKinds, Listener, ListenerId, Signal};
pub use observer::{Matcher, Observer};
pub use registry::Registry;
pub use storage::{ComponentStore, ErasedStore, ReadStore, SignalPoint, StoreHandle, WriteStore};
