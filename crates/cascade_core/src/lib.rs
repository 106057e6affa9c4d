//! # CASCADE Core Engine
//!
//! Change-driven system execution on top of a sparse-set ECS:
//! - Component stores announce every construct, update and destroy
//! - Observers collect the entities a system has to revisit
//! - Systems recompute only those entities, in a fixed order per frame
//!
//! ## Architecture Rules
//!
//! 1. **No full scans in steady state** - work is proportional to what changed
//! 2. **Declared access** - a system touches exactly the types it declared
//! 3. **One writer per type** - enforced when systems are scheduled
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascade_core::{Registry, Schedule, SystemBuilder};
//!
//! let mut registry = Registry::new();
//! let mut schedule = Schedule::new();
//! schedule.add_system(
//!     SystemBuilder::new("system_a")
//!         .reads::<C1>()
//!         .writes::<C2>()
//!         .build(&mut registry, |access, e, _| {
//!             let v = access.read::<C1>().expect(e).v;
//!             access.write::<C2>().upsert(e, C2 { v: v + 1.0 });
//!             Ok(())
//!         })?,
//! )?;
//!
//! let e = registry.create();
//! registry.emplace(e, C1 { v: 5.0 })?;
//! schedule.run_frame(1.0 / 60.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod ecs;
pub mod error;
pub mod schedule;
pub mod system;

pub use config::EngineConfig;
pub use diagnostics::{attach_change_log, detach_change_log, ChangeLog, ChangeRecord, SharedChangeLog};
pub use ecs::{
    ChangeEvent, ChangeKind, ChangeKinds, Component, ComponentInfo, ComponentStore, EntityId,
    ListenerId, Matcher, Observer, ReadStore, Registry, StoreHandle, WriteStore,
};
pub use error::{EcsError, EcsResult};
pub use schedule::{Dependency, FrameReport, Schedule, SystemHandle, SystemRun, Visibility};
pub use system::{AccessDescriptor, ObserverSystem, System, SystemAccess, SystemBuilder};
