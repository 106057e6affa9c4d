//! # Systems
//!
//! A system is a unit of logic that reacts to component changes.
//!
//! Every system:
//! - declares which component types it reads and which it writes
//! - is handed store handles for exactly those types, nothing else
//! - processes only the entities its observer marked dirty since the
//!   previous update
//!
//! Declarations are checked when the system is built and again when it is
//! added to a [`crate::schedule::Schedule`]. Touching an undeclared type at
//! runtime is a programming error and panics.
//!
//! ## Write discipline
//!
//! Outputs are written with `upsert`: the first write emplaces (raising
//! `Construct`), later writes patch (raising `Update`). Either way downstream
//! observers see the change.

mod access;
mod builder;

pub use access::{AccessDescriptor, SystemAccess};
pub use builder::{ObserverSystem, SystemBuilder};

/// A unit of executable logic driven by the schedule.
///
/// Systems must be `Send` so a schedule can be moved to another thread.
pub trait System: Send {
    /// Human-readable name, used in logs and reports.
    fn name(&self) -> &str;

    /// The component types this system reads and writes.
    fn access(&self) -> &AccessDescriptor;

    /// Processes the pending dirty set.
    ///
    /// Returns the number of entities processed.
    ///
    /// # Errors
    ///
    /// `SystemFailed` if the system's logic failed; unprocessed entities
    /// stay pending.
    fn update(&mut self, delta_time: f32) -> crate::error::EcsResult<usize>;
}
