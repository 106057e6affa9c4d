//! The system factory and the observer-driven system it produces.

use crate::ecs::observer::MAX_MATCHERS;
use crate::ecs::{Component, ComponentInfo, EntityId, Matcher, Observer, Registry};
use crate::error::{EcsError, EcsResult};

use super::access::{bind_read, bind_write, AccessDescriptor, Binder, SystemAccess};
use super::System;

/// Declares a system's access and watch specification, then binds it.
///
/// # Example
///
/// ```rust,ignore
/// let system_a = SystemBuilder::new("system_a")
///     .reads::<C1>()
///     .writes::<C2>()
///     .build(&mut registry, |access, entity, _dt| {
///         let c1 = access.read::<C1>().expect(entity).v;
///         access.write::<C2>().upsert(entity, C2 { v: c1 + 1.0 });
///         Ok(())
///     })?;
/// ```
pub struct SystemBuilder {
    name: String,
    reads: Vec<(ComponentInfo, Binder)>,
    writes: Vec<(ComponentInfo, Binder)>,
    watch: Vec<Matcher>,
    /// `changed` of every read, used when nothing was watched explicitly.
    implicit: Vec<Matcher>,
}

impl SystemBuilder {
    /// Starts a system declaration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            watch: Vec::new(),
            implicit: Vec::new(),
        }
    }

    /// Declares `C` as an input.
    #[must_use]
    pub fn reads<C: Component>(mut self) -> Self {
        self.reads.push((ComponentInfo::of::<C>(), bind_read::<C>));
        self.implicit.push(Matcher::changed::<C>());
        self
    }

    /// Declares `C` as an output.
    #[must_use]
    pub fn writes<C: Component>(mut self) -> Self {
        self.writes.push((ComponentInfo::of::<C>(), bind_write::<C>));
        self
    }

    /// Adds a matcher to the watch specification.
    #[must_use]
    pub fn watch(mut self, matcher: Matcher) -> Self {
        self.watch.push(matcher);
        self
    }

    /// Binds the system to `registry`.
    ///
    /// Creates the observer, and read/write handles for exactly the declared
    /// types. `handler` runs once per dirty entity on every update.
    ///
    /// # Errors
    ///
    /// - `InvalidAccess` if a type is both read and written, a matcher
    ///   triggers on a type that is not a declared read, or a guard names a
    ///   type that is neither read nor written
    /// - `EmptyWatch` if there is nothing to watch
    /// - `TooManyMatchers` past the observer's matcher limit
    pub fn build<F>(self, registry: &mut Registry, handler: F) -> EcsResult<ObserverSystem<F>>
    where
        F: FnMut(&SystemAccess, EntityId, f32) -> EcsResult<()> + Send,
    {
        let access = AccessDescriptor::new(
            &self.name,
            self.reads.iter().map(|(info, _)| *info),
            self.writes.iter().map(|(info, _)| *info),
        )?;

        let matchers = if self.watch.is_empty() {
            self.implicit
        } else {
            self.watch
        };
        if matchers.is_empty() {
            return Err(EcsError::EmptyWatch(self.name));
        }
        if matchers.len() > MAX_MATCHERS {
            return Err(EcsError::TooManyMatchers {
                system: self.name,
                count: matchers.len(),
                max: MAX_MATCHERS,
            });
        }
        // Triggers must be reads; guards may name any declared type
        let stray = matchers.iter().find_map(|matcher| {
            std::iter::once(matcher.trigger())
                .filter(|trigger| !access.reads_type(trigger.id()))
                .chain(
                    matcher
                        .required()
                        .chain(matcher.excluded())
                        .filter(|guard| !access.reads_type(guard.id()) && !access.writes_type(guard.id())),
                )
                .next()
        });
        if let Some(stray) = stray {
            return Err(EcsError::InvalidAccess {
                system: self.name,
                component: stray.name(),
            });
        }

        let bound = SystemAccess::bind(&self.name, registry, &self.reads, &self.writes);
        let observer = Observer::new(registry, matchers);

        tracing::debug!(
            system = %self.name,
            reads = access.reads().len(),
            writes = access.writes().len(),
            "system built"
        );

        Ok(ObserverSystem {
            name: self.name,
            access,
            bound,
            observer,
            handler,
        })
    }
}

impl std::fmt::Debug for SystemBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let infos = |declared: &[(ComponentInfo, Binder)]| {
            declared.iter().map(|(info, _)| *info).collect::<Vec<_>>()
        };
        f.debug_struct("SystemBuilder")
            .field("name", &self.name)
            .field("reads", &infos(&self.reads))
            .field("writes", &infos(&self.writes))
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

/// A system whose work is the dirty set of its observer.
///
/// Each update drains the observer and runs the handler per entity. If the
/// handler fails, the rest of the batch stays pending for the next update.
pub struct ObserverSystem<F> {
    name: String,
    access: AccessDescriptor,
    bound: SystemAccess,
    observer: Observer,
    handler: F,
}

impl<F> ObserverSystem<F> {
    /// The observer feeding this system.
    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Entities waiting for the next update.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.observer.len()
    }
}

impl<F> System for ObserverSystem<F>
where
    F: FnMut(&SystemAccess, EntityId, f32) -> EcsResult<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn access(&self) -> &AccessDescriptor {
        &self.access
    }

    fn update(&mut self, delta_time: f32) -> EcsResult<usize> {
        let Self {
            name,
            bound,
            observer,
            handler,
            ..
        } = self;

        let processed = observer
            .process(|entity| handler(bound, entity, delta_time))
            .map_err(|cause| EcsError::SystemFailed {
                system: name.clone(),
                reason: cause.to_string(),
            })?;

        tracing::debug!(system = %name, processed, "system updated");
        Ok(processed)
    }
}

impl<F> std::fmt::Debug for ObserverSystem<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSystem")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}
