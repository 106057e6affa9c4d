//! # Schedule
//!
//! An ordered list of systems, updated once per frame in registration order.
//!
//! ```text
//! Frame N:
//! ┌───────────────────────────────────────────────────────────┐
//! │ 1. system_a.update(dt)                                    │
//! │    └─ drains its observer, upserts outputs                │
//! │       └─ each upsert raises an event, marking system_b's  │
//! │          observer dirty                                   │
//! │ 2. system_b.update(dt)                                    │
//! │    └─ sees system_a's writes in the same frame            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Registration order decides visibility: a reader registered after the
//! writer of a type sees that frame's writes; a reader registered before it
//! sees them on the next frame. [`Schedule::dependencies`] reports which is
//! which.
//!
//! A component type has at most one writer per schedule.

use std::any::TypeId;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::ecs::ComponentInfo;
use crate::error::{EcsError, EcsResult};
use crate::system::{AccessDescriptor, System};

/// Uniform wrapper around a boxed system.
pub struct SystemHandle {
    inner: Box<dyn System>,
}

impl SystemHandle {
    /// Boxes `system`.
    pub fn new(system: impl System + 'static) -> Self {
        Self {
            inner: Box::new(system),
        }
    }

    /// See [`System::update`].
    ///
    /// # Errors
    ///
    /// Whatever the system reports.
    pub fn update(&mut self, delta_time: f32) -> EcsResult<usize> {
        self.inner.update(delta_time)
    }

    /// The system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The system's declared access.
    #[must_use]
    pub fn access(&self) -> &AccessDescriptor {
        self.inner.access()
    }

    /// Type IDs the system reads.
    #[must_use]
    pub fn read_types(&self) -> Vec<TypeId> {
        self.access().reads().iter().map(|info| info.id()).collect()
    }

    /// Type IDs the system writes.
    #[must_use]
    pub fn write_types(&self) -> Vec<TypeId> {
        self.access().writes().iter().map(|info| info.id()).collect()
    }
}

impl std::fmt::Debug for SystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemHandle")
            .field("name", &self.name())
            .field("access", self.access())
            .finish()
    }
}

/// When a reader observes a writer's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// The reader runs after the writer.
    SameFrame,
    /// The reader runs before the writer.
    NextFrame,
}

/// A writer/reader pair sharing one component type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    /// The shared component type.
    pub component: ComponentInfo,
    /// The system writing it.
    pub writer: String,
    /// The system reading it.
    pub reader: String,
    /// When the reader sees the writer's output.
    pub visibility: Visibility,
}

/// Outcome of one system in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemRun {
    /// The system's name.
    pub name: String,
    /// Entities processed (zero on failure).
    pub processed: usize,
    /// Wall time spent in `update`, in microseconds.
    pub elapsed_us: u64,
    /// The failure, if the update failed.
    pub error: Option<EcsError>,
}

/// Outcome of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// One entry per system, in run order.
    pub runs: Vec<SystemRun>,
}

impl FrameReport {
    /// Total entities processed by all systems.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.runs.iter().map(|run| run.processed).sum()
    }

    /// Runs that failed.
    pub fn failures(&self) -> impl Iterator<Item = &SystemRun> {
        self.runs.iter().filter(|run| run.error.is_some())
    }

    /// Whether every system succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Ordered systems run once per frame.
#[derive(Debug)]
pub struct Schedule {
    systems: Vec<SystemHandle>,
    frame: u64,
    warn_on_late_reads: bool,
}

impl Schedule {
    /// Creates an empty schedule with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates an empty schedule.
    #[must_use]
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            systems: Vec::new(),
            frame: 0,
            warn_on_late_reads: config.warn_on_late_reads,
        }
    }

    /// Appends a system.
    ///
    /// # Errors
    ///
    /// `WriteConflict` if the system writes a type another system already
    /// writes. The schedule is unchanged in that case.
    pub fn add_system(&mut self, system: impl System + 'static) -> EcsResult<()> {
        self.add_handle(SystemHandle::new(system))
    }

    /// Appends an already boxed system. See [`Schedule::add_system`].
    ///
    /// # Errors
    ///
    /// `WriteConflict` on a second writer of a type.
    pub fn add_handle(&mut self, handle: SystemHandle) -> EcsResult<()> {
        for existing in &self.systems {
            if let Some(component) = existing.access().conflicts_with(handle.access()) {
                return Err(EcsError::WriteConflict {
                    component: component.name(),
                    existing: existing.name().to_string(),
                    incoming: handle.name().to_string(),
                });
            }
        }

        if self.warn_on_late_reads {
            // A new writer is late for every reader already registered
            for reader in &self.systems {
                for info in handle.access().writes() {
                    if reader.access().reads_type(info.id()) {
                        tracing::warn!(
                            component = info.name(),
                            writer = handle.name(),
                            reader = reader.name(),
                            "reader runs before writer; output visible next frame"
                        );
                    }
                }
            }
        }

        tracing::debug!(system = handle.name(), position = self.systems.len(), "system added");
        self.systems.push(handle);
        Ok(())
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether the schedule has no systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Systems in run order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemHandle> {
        self.systems.iter()
    }

    /// System names in run order.
    #[must_use]
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(SystemHandle::name).collect()
    }

    /// Frames run so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Every writer/reader pair, in writer order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies = Vec::new();
        for (w, writer) in self.systems.iter().enumerate() {
            for info in writer.access().writes() {
                for (r, reader) in self.systems.iter().enumerate() {
                    if r == w || !reader.access().reads_type(info.id()) {
                        continue;
                    }
                    dependencies.push(Dependency {
                        component: *info,
                        writer: writer.name().to_string(),
                        reader: reader.name().to_string(),
                        visibility: if r > w {
                            Visibility::SameFrame
                        } else {
                            Visibility::NextFrame
                        },
                    });
                }
            }
        }
        dependencies
    }

    /// Updates every system once, in registration order.
    ///
    /// A failing system is logged and recorded; the systems after it still
    /// run. Its unprocessed entities stay pending for the next frame.
    pub fn run_frame(&mut self, delta_time: f32) -> FrameReport {
        self.frame += 1;
        let mut runs = Vec::with_capacity(self.systems.len());

        for system in &mut self.systems {
            let start = Instant::now();
            let result = system.update(delta_time);
            let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

            let (processed, error) = match result {
                Ok(processed) => (processed, None),
                Err(error) => {
                    tracing::warn!(
                        system = system.name(),
                        frame = self.frame,
                        %error,
                        "system update failed"
                    );
                    (0, Some(error))
                }
            };
            runs.push(SystemRun {
                name: system.name().to_string(),
                processed,
                elapsed_us,
                error,
            });
        }

        let report = FrameReport {
            frame: self.frame,
            runs,
        };
        tracing::debug!(
            frame = report.frame,
            processed = report.processed(),
            "frame complete"
        );
        report
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, Registry};
    use crate::system::SystemBuilder;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Raw(f32);

    impl Component for Raw {
        const NAME: &'static str = "Raw";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Scaled(f32);

    impl Component for Scaled {
        const NAME: &'static str = "Scaled";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Clamped(f32);

    impl Component for Clamped {
        const NAME: &'static str = "Clamped";
    }

    fn scale(registry: &mut Registry) -> impl System {
        SystemBuilder::new("scale")
            .reads::<Raw>()
            .writes::<Scaled>()
            .build(registry, |access, entity, _| {
                let raw = access.read::<Raw>().expect(entity).0;
                access.write::<Scaled>().upsert(entity, Scaled(raw * 2.0));
                Ok(())
            })
            .unwrap()
    }

    fn clamp(registry: &mut Registry) -> impl System {
        SystemBuilder::new("clamp")
            .reads::<Scaled>()
            .writes::<Clamped>()
            .build(registry, |access, entity, _| {
                let scaled = access.read::<Scaled>().expect(entity).0;
                access.write::<Clamped>().upsert(entity, Clamped(scaled.min(10.0)));
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn test_chain_settles_in_one_frame() {
        let mut registry = Registry::new();
        let mut schedule = Schedule::new();
        schedule.add_system(scale(&mut registry)).unwrap();
        schedule.add_system(clamp(&mut registry)).unwrap();

        let e = registry.create();
        registry.emplace(e, Raw(8.0)).unwrap();

        let report = schedule.run_frame(0.016);
        assert!(report.is_ok());
        assert_eq!(report.frame, 1);
        assert_eq!(report.processed(), 2);
        assert_eq!(registry.get::<Clamped>(e), Some(Clamped(10.0)));

        assert_eq!(schedule.run_frame(0.016).processed(), 0);
    }

    #[test]
    fn test_reverse_order_lags_one_frame() {
        let mut registry = Registry::new();
        let mut schedule = Schedule::new();
        schedule.add_system(clamp(&mut registry)).unwrap();
        schedule.add_system(scale(&mut registry)).unwrap();

        let e = registry.create();
        registry.emplace(e, Raw(1.0)).unwrap();

        schedule.run_frame(0.016);
        assert_eq!(registry.get::<Scaled>(e), Some(Scaled(2.0)));
        assert_eq!(registry.get::<Clamped>(e), None);

        schedule.run_frame(0.016);
        assert_eq!(registry.get::<Clamped>(e), Some(Clamped(2.0)));

        let deps = schedule.dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].writer, "scale");
        assert_eq!(deps[0].reader, "clamp");
        assert_eq!(deps[0].visibility, Visibility::NextFrame);
    }

    #[test]
    fn test_second_writer_rejected() {
        let mut registry = Registry::new();
        let mut schedule = Schedule::new();
        schedule.add_system(scale(&mut registry)).unwrap();

        let rival = SystemBuilder::new("rival")
            .reads::<Clamped>()
            .writes::<Scaled>()
            .build(&mut registry, |_, _, _| Ok(()))
            .unwrap();

        let err = schedule.add_system(rival).unwrap_err();
        assert_eq!(
            err,
            EcsError::WriteConflict {
                component: "Scaled",
                existing: "scale".to_string(),
                incoming: "rival".to_string(),
            }
        );
        assert_eq!(schedule.system_names(), vec!["scale"]);
    }

    #[test]
    fn test_failure_does_not_stop_frame() {
        let mut registry = Registry::new();
        let mut schedule = Schedule::new();
        let broken = SystemBuilder::new("broken")
            .reads::<Raw>()
            .build(&mut registry, |_, entity, _| {
                Err(EcsError::EntityNotAlive(entity))
            })
            .unwrap();
        schedule.add_system(broken).unwrap();
        schedule.add_system(scale(&mut registry)).unwrap();

        let e = registry.create();
        registry.emplace(e, Raw(3.0)).unwrap();

        let report = schedule.run_frame(0.016);
        assert!(!report.is_ok());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.runs[1].processed, 1);
        assert_eq!(registry.get::<Scaled>(e), Some(Scaled(6.0)));
    }

    #[test]
    fn test_handle_reports_types() {
        let mut registry = Registry::new();
        let handle = SystemHandle::new(scale(&mut registry));
        assert_eq!(handle.name(), "scale");
        assert_eq!(handle.read_types(), vec![TypeId::of::<Raw>()]);
        assert_eq!(handle.write_types(), vec![TypeId::of::<Scaled>()]);
    }
}
