//! # Sample Pipeline
//!
//! Three components and two systems:
//!
//! ```text
//!   C1 ──► System A ──► C2 = C1 + 1
//!   C1 ─┐
//!       ├► System B ──► C3 = C1 + C2
//!   C2 ─┘
//! ```
//!
//! System A runs first, so a C1 edit reaches C3 in the same frame.

use cascade_core::{
    attach_change_log, ChangeLog, Component, EcsResult, EngineConfig, EntityId, FrameReport,
    Matcher, Registry, Schedule, SharedChangeLog, System, SystemBuilder,
};

/// Input value, edited from outside.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct C1 {
    /// The value.
    pub v: f32,
}

impl Component for C1 {
    const NAME: &'static str = "C1";
}

/// Derived by System A.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct C2 {
    /// The value.
    pub v: f32,
}

impl Component for C2 {
    const NAME: &'static str = "C2";
}

/// Derived by System B.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct C3 {
    /// The value.
    pub v: f32,
}

impl Component for C3 {
    const NAME: &'static str = "C3";
}

/// System A: `C2 = C1 + 1`, for every entity whose C1 changed.
///
/// # Errors
///
/// Propagates declaration errors from the builder.
pub fn system_a(registry: &mut Registry) -> EcsResult<impl System> {
    SystemBuilder::new("system_a")
        .reads::<C1>()
        .writes::<C2>()
        .build(registry, |access, entity, _| {
            let c1 = access.read::<C1>().expect(entity).v;
            access.write::<C2>().upsert(entity, C2 { v: c1 + 1.0 });
            Ok(())
        })
}

/// System B: `C3 = C1 + C2`, for every entity holding both whose C1 or C2
/// changed.
///
/// # Errors
///
/// Propagates declaration errors from the builder.
pub fn system_b(registry: &mut Registry) -> EcsResult<impl System> {
    SystemBuilder::new("system_b")
        .reads::<C1>()
        .reads::<C2>()
        .writes::<C3>()
        .watch(Matcher::changed::<C1>().with::<C2>())
        .watch(Matcher::changed::<C2>().with::<C1>())
        .build(registry, |access, entity, _| {
            let c1 = access.read::<C1>().expect(entity).v;
            let c2 = access.read::<C2>().expect(entity).v;
            access.write::<C3>().upsert(entity, C3 { v: c1 + c2 });
            Ok(())
        })
}

/// Registry, schedule and change log wired together.
pub struct Pipeline {
    registry: Registry,
    schedule: Schedule,
    log: SharedChangeLog,
    spawned: Vec<EntityId>,
}

impl Pipeline {
    /// Builds the pipeline: change log on C1..C3, then System A, System B.
    ///
    /// # Errors
    ///
    /// Fails if the systems cannot be declared or scheduled.
    pub fn new(config: &EngineConfig) -> EcsResult<Self> {
        let mut registry = Registry::with_config(config);
        let mut schedule = Schedule::with_config(config);

        let log = ChangeLog::shared();
        attach_change_log::<C1>(&mut registry, &log);
        attach_change_log::<C2>(&mut registry, &log);
        attach_change_log::<C3>(&mut registry, &log);

        schedule.add_system(system_a(&mut registry)?)?;
        schedule.add_system(system_b(&mut registry)?)?;

        Ok(Self {
            registry,
            schedule,
            log,
            spawned: Vec::new(),
        })
    }

    /// Creates an entity holding `C1 { v: value }`.
    ///
    /// # Errors
    ///
    /// Propagates registry errors.
    pub fn spawn(&mut self, value: f32) -> EcsResult<EntityId> {
        let entity = self.registry.create();
        self.registry.emplace(entity, C1 { v: value })?;
        self.spawned.push(entity);
        tracing::info!(entity = %entity, value, "spawned");
        Ok(entity)
    }

    /// Sets C1 of `entity` through the change path.
    ///
    /// # Errors
    ///
    /// `EntityNotAlive` or `NotFound` if the entity cannot be edited.
    pub fn edit(&mut self, entity: EntityId, value: f32) -> EcsResult<()> {
        self.registry.patch::<C1>(entity, |c1| c1.v = value)?;
        tracing::info!(entity = %entity, value, "edited");
        Ok(())
    }

    /// Destroys `entity` and drops its change-log rows.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        let destroyed = self.registry.destroy(entity);
        if destroyed {
            self.log.lock().forget(entity);
            tracing::info!(entity = %entity, "destroyed");
        }
        destroyed
    }

    /// Runs one frame.
    pub fn frame(&mut self, delta_time: f32) -> FrameReport {
        self.schedule.run_frame(delta_time)
    }

    /// The `n`-th spawned entity, in spawn order.
    #[must_use]
    pub fn spawned(&self, n: usize) -> Option<EntityId> {
        self.spawned.get(n).copied()
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The schedule.
    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The change log.
    #[must_use]
    pub fn log(&self) -> &SharedChangeLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::ComponentInfo;

    #[test]
    fn test_spawn_propagates_in_one_frame() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        let e = pipeline.spawn(5.0).unwrap();

        let report = pipeline.frame(0.016);
        assert!(report.is_ok());
        assert_eq!(pipeline.registry().get::<C2>(e), Some(C2 { v: 6.0 }));
        assert_eq!(pipeline.registry().get::<C3>(e), Some(C3 { v: 11.0 }));
    }

    #[test]
    fn test_edit_recomputes_only_that_entity() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        let a = pipeline.spawn(1.0).unwrap();
        let b = pipeline.spawn(2.0).unwrap();
        pipeline.frame(0.016);

        pipeline.edit(b, 10.0).unwrap();
        let report = pipeline.frame(0.016);
        assert_eq!(report.runs[0].processed, 1);
        assert_eq!(report.runs[1].processed, 1);
        assert_eq!(pipeline.registry().get::<C3>(a), Some(C3 { v: 3.0 }));
        assert_eq!(pipeline.registry().get::<C3>(b), Some(C3 { v: 21.0 }));
    }

    #[test]
    fn test_change_log_counts() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        let e = pipeline.spawn(1.0).unwrap();
        pipeline.frame(0.016);
        pipeline.edit(e, 2.0).unwrap();
        pipeline.frame(0.016);

        let log = pipeline.log().lock();
        assert_eq!(log.count(e, ComponentInfo::of::<C1>()), 2);
        assert_eq!(log.count(e, ComponentInfo::of::<C2>()), 2);
        assert_eq!(log.count(e, ComponentInfo::of::<C3>()), 2);
    }

    #[test]
    fn test_destroy_forgets_rows() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        let e = pipeline.spawn(1.0).unwrap();
        pipeline.frame(0.016);

        assert!(pipeline.destroy(e));
        assert!(!pipeline.destroy(e));
        assert!(pipeline.log().lock().is_empty());
        assert_eq!(pipeline.frame(0.016).processed(), 0);
    }
}
