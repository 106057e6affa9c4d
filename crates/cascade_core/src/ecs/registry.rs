//! # Registry
//!
//! The central container: entity lifetimes, one store per component type,
//! and the context table.
//!
//! Stores are created lazily the first time a type is touched and live as
//! long as the registry. Every mutation made through the registry goes
//! through the owning store, so it raises the same change events a system's
//! write would.

use std::any::{Any, TypeId};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::component::{Component, ComponentInfo};
use super::context::ContextTable;
use super::entity::{EntityAllocator, EntityId};
use super::event::{ChangeKind, ChangeKinds};
use super::storage::{ComponentStore, ErasedStore, ReadStore, Shared, SignalPoint, StoreHandle, WriteStore};
use crate::config::EngineConfig;
use crate::error::{EcsError, EcsResult};

struct StoreEntry {
    /// `Shared<C>` for the entry's component type.
    typed: Box<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedStore>,
}

/// Owns entities, component stores and the context table.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::new();
/// let e = registry.create();
/// registry.emplace(e, Health { v: 1.0 })?;
/// registry.patch::<Health>(e, |h| h.v = 0.5)?;
/// registry.destroy(e);
/// ```
pub struct Registry {
    entities: EntityAllocator,
    /// Stores in creation order.
    stores: IndexMap<TypeId, StoreEntry>,
    context: ContextTable,
    config: EngineConfig,
}

impl Registry {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates a registry with the given configuration.
    #[must_use]
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.initial_entities),
            stores: IndexMap::new(),
            context: ContextTable::new(),
            config: config.clone(),
        }
    }

    /// The configuration this registry was created with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates a fresh entity.
    pub fn create(&mut self) -> EntityId {
        self.entities.allocate()
    }

    /// Destroys an entity, removing it from every store.
    ///
    /// Each removal raises a `Destroy` event so observers can evict the
    /// entity from their pending sets. Returns `false` for dead or stale IDs.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }

        let mut removed = 0usize;
        for entry in self.stores.values() {
            if entry.erased.remove_entity(entity) {
                removed += 1;
            }
        }
        self.entities.free(entity);

        tracing::debug!(entity = %entity, components = removed, "entity destroyed");
        true
    }

    /// Checks if an entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// All alive entities in slot order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.iter_alive().collect()
    }

    // =========================================================================
    // Stores
    // =========================================================================

    fn shared<C: Component>(&mut self) -> Shared<C> {
        let capacity = self.config.store_capacity;
        let trace = self.config.log_change_events;
        let entry = self.stores.entry(TypeId::of::<C>()).or_insert_with(|| {
            let mut store = ComponentStore::<C>::with_capacity(capacity);
            store.set_trace_events(trace);
            let shared: Shared<C> = Arc::new(RwLock::new(store));
            tracing::debug!(component = C::NAME, "store created");
            StoreEntry {
                erased: Arc::clone(&shared) as Arc<dyn ErasedStore>,
                typed: Box::new(shared),
            }
        });

        match entry.typed.downcast_ref::<Shared<C>>() {
            Some(shared) => Arc::clone(shared),
            None => unreachable!("store for {} registered under a foreign type", C::NAME),
        }
    }

    fn existing<C: Component>(&self) -> Option<&Shared<C>> {
        self.stores
            .get(&TypeId::of::<C>())
            .and_then(|entry| entry.typed.downcast_ref::<Shared<C>>())
    }

    /// Returns the store for `C`, creating it if absent.
    pub fn store<C: Component>(&mut self) -> StoreHandle<C> {
        StoreHandle::from_shared(self.shared::<C>())
    }

    /// Returns a read-only handle to the store for `C`.
    pub fn read_store<C: Component>(&mut self) -> ReadStore<C> {
        self.store::<C>().read_only()
    }

    /// Returns a read/write handle to the store for `C`.
    pub fn write_store<C: Component>(&mut self) -> WriteStore<C> {
        self.store::<C>().writable()
    }

    /// Returns the type-erased store for `C`, creating it if absent.
    pub fn erased<C: Component>(&mut self) -> Arc<dyn ErasedStore> {
        self.store::<C>().erased()
    }

    /// Returns the type-erased store for a type ID, if it exists.
    #[must_use]
    pub fn erased_store(&self, type_id: TypeId) -> Option<Arc<dyn ErasedStore>> {
        self.stores.get(&type_id).map(|entry| Arc::clone(&entry.erased))
    }

    /// Component types that have a store, in creation order.
    #[must_use]
    pub fn component_types(&self) -> Vec<ComponentInfo> {
        self.stores.values().map(|entry| entry.erased.info()).collect()
    }

    // =========================================================================
    // Component access
    // =========================================================================

    /// Checks whether `entity` holds `C`.
    #[must_use]
    pub fn contains<C: Component>(&self, entity: EntityId) -> bool {
        self.existing::<C>()
            .is_some_and(|shared| shared.read().contains(entity))
    }

    /// Copies `C` of `entity` out.
    ///
    /// `None` is the normal "skip this entity" answer for optional display.
    #[must_use]
    pub fn get<C: Component>(&self, entity: EntityId) -> Option<C> {
        self.existing::<C>()
            .and_then(|shared| shared.read().try_get(entity).cloned())
    }

    fn ensure_alive(&self, entity: EntityId) -> EcsResult<()> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::EntityNotAlive(entity))
        }
    }

    /// Gives `entity` a new `C`, raising `Construct`.
    ///
    /// # Errors
    ///
    /// `EntityNotAlive` for dead handles, `AlreadyExists` if `C` is present.
    pub fn emplace<C: Component>(&mut self, entity: EntityId, value: C) -> EcsResult<()> {
        self.ensure_alive(entity)?;
        self.shared::<C>().write().emplace(entity, value)
    }

    /// Mutates `C` of `entity` in place, raising `Update`.
    ///
    /// # Errors
    ///
    /// `EntityNotAlive` for dead handles, `NotFound` if `C` is absent.
    pub fn patch<C: Component>(
        &mut self,
        entity: EntityId,
        mutate: impl FnOnce(&mut C),
    ) -> EcsResult<()> {
        self.ensure_alive(entity)?;
        self.shared::<C>().write().patch(entity, mutate)
    }

    /// Writes `C` of `entity`: patch if present, emplace otherwise.
    ///
    /// # Errors
    ///
    /// `EntityNotAlive` for dead handles.
    pub fn upsert<C: Component>(&mut self, entity: EntityId, value: C) -> EcsResult<ChangeKind> {
        self.ensure_alive(entity)?;
        Ok(self.shared::<C>().write().upsert(entity, value))
    }

    /// Removes `C` from `entity`, raising `Destroy`.
    pub fn remove<C: Component>(&mut self, entity: EntityId) -> Option<C> {
        self.existing::<C>()
            .and_then(|shared| shared.write().remove(entity))
    }

    /// Entities holding every listed component type.
    ///
    /// An empty list yields every alive entity. A type without a store
    /// yields nothing.
    #[must_use]
    pub fn entities_with(&self, types: &[TypeId]) -> Vec<EntityId> {
        if types.is_empty() {
            return self.entities();
        }

        let Some(stores) = types
            .iter()
            .map(|type_id| self.erased_store(*type_id))
            .collect::<Option<Vec<_>>>()
        else {
            return Vec::new();
        };

        // Walk the smallest store, probe the others
        let Some(pivot) = (0..stores.len()).min_by_key(|&i| stores[i].len()) else {
            return Vec::new();
        };

        stores[pivot]
            .entities()
            .into_iter()
            .filter(|entity| {
                stores
                    .iter()
                    .enumerate()
                    .all(|(i, store)| i == pivot || store.contains(*entity))
            })
            .collect()
    }

    /// Visits every entity holding both `A` and `B`.
    pub fn each2<A: Component, B: Component>(&self, mut visit: impl FnMut(EntityId, &A, &B)) {
        let (Some(a), Some(b)) = (self.existing::<A>(), self.existing::<B>()) else {
            return;
        };
        let (a, b) = (a.read(), b.read());
        for (entity, value_a) in a.iter() {
            if let Some(value_b) = b.try_get(entity) {
                visit(entity, value_a, value_b);
            }
        }
    }

    /// Visits every entity holding `A`, `B` and `C`.
    pub fn each3<A: Component, B: Component, C: Component>(
        &self,
        mut visit: impl FnMut(EntityId, &A, &B, &C),
    ) {
        let (Some(a), Some(b), Some(c)) =
            (self.existing::<A>(), self.existing::<B>(), self.existing::<C>())
        else {
            return;
        };
        let (a, b, c) = (a.read(), b.read(), c.read());
        for (entity, value_a) in a.iter() {
            if let (Some(value_b), Some(value_c)) = (b.try_get(entity), c.try_get(entity)) {
                visit(entity, value_a, value_b, value_c);
            }
        }
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Subscription point for `Construct` events of `C`.
    pub fn on_construct<C: Component>(&mut self) -> SignalPoint {
        SignalPoint::new(self.erased::<C>(), ChangeKinds::CONSTRUCT)
    }

    /// Subscription point for `Update` events of `C`.
    pub fn on_update<C: Component>(&mut self) -> SignalPoint {
        SignalPoint::new(self.erased::<C>(), ChangeKinds::UPDATE)
    }

    /// Subscription point for `Destroy` events of `C`.
    pub fn on_destroy<C: Component>(&mut self) -> SignalPoint {
        SignalPoint::new(self.erased::<C>(), ChangeKinds::DESTROY)
    }

    // =========================================================================
    // Context
    // =========================================================================

    /// The context table.
    #[must_use]
    pub fn context(&self) -> &ContextTable {
        &self.context
    }

    /// The context table, mutably.
    pub fn context_mut(&mut self) -> &mut ContextTable {
        &mut self.context
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.alive_count())
            .field("stores", &self.component_types())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ChangeEvent;
    use parking_lot::Mutex;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Speed {
        v: f32,
    }

    impl Component for Speed {
        const NAME: &'static str = "Speed";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Fuel {
        v: f32,
    }

    impl Component for Fuel {
        const NAME: &'static str = "Fuel";
    }

    #[test]
    fn test_store_is_created_once() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.store::<Speed>().emplace(e, Speed { v: 1.0 }).unwrap();

        assert_eq!(registry.store::<Speed>().get(e), Some(Speed { v: 1.0 }));
        assert_eq!(registry.component_types(), vec![ComponentInfo::of::<Speed>()]);
    }

    #[test]
    fn test_emplace_on_dead_entity_rejected() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.destroy(e);

        assert_eq!(
            registry.emplace(e, Speed { v: 1.0 }),
            Err(EcsError::EntityNotAlive(e))
        );
    }

    #[test]
    fn test_destroy_removes_from_every_store() {
        let mut registry = Registry::new();
        let e = registry.create();
        let keep = registry.create();
        registry.emplace(e, Speed { v: 1.0 }).unwrap();
        registry.emplace(e, Fuel { v: 2.0 }).unwrap();
        registry.emplace(keep, Fuel { v: 3.0 }).unwrap();

        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&destroyed);
        registry
            .on_destroy::<Fuel>()
            .connect(move |event: &ChangeEvent| sink.lock().push(event.entity));

        assert!(registry.destroy(e));
        assert!(!registry.destroy(e));

        assert!(!registry.contains::<Speed>(e));
        assert!(!registry.contains::<Fuel>(e));
        assert!(registry.contains::<Fuel>(keep));
        assert_eq!(*destroyed.lock(), vec![e]);
        assert_eq!(registry.alive_count(), 1);
    }

    #[test]
    fn test_entities_with_intersects() {
        let mut registry = Registry::new();
        let both = registry.create();
        let only_speed = registry.create();
        registry.emplace(both, Speed { v: 1.0 }).unwrap();
        registry.emplace(both, Fuel { v: 1.0 }).unwrap();
        registry.emplace(only_speed, Speed { v: 2.0 }).unwrap();

        let ids = [TypeId::of::<Speed>(), TypeId::of::<Fuel>()];
        assert_eq!(registry.entities_with(&ids), vec![both]);
        assert_eq!(registry.entities_with(&[]).len(), 2);
        assert!(registry.entities_with(&[TypeId::of::<u8>()]).is_empty());
    }

    #[test]
    fn test_each2_visits_pairs() {
        let mut registry = Registry::new();
        let a = registry.create();
        let b = registry.create();
        registry.emplace(a, Speed { v: 1.0 }).unwrap();
        registry.emplace(a, Fuel { v: 10.0 }).unwrap();
        registry.emplace(b, Speed { v: 2.0 }).unwrap();

        let mut seen = Vec::new();
        registry.each2::<Speed, Fuel>(|e, s, f| seen.push((e, s.v + f.v)));
        assert_eq!(seen, vec![(a, 11.0)]);
    }

    #[test]
    fn test_get_missing_is_none() {
        let mut registry = Registry::new();
        let e = registry.create();
        assert_eq!(registry.get::<Speed>(e), None);
        registry.emplace(e, Speed { v: 4.0 }).unwrap();
        assert_eq!(registry.get::<Speed>(e), Some(Speed { v: 4.0 }));
        assert_eq!(registry.remove::<Speed>(e), Some(Speed { v: 4.0 }));
        assert_eq!(registry.get::<Speed>(e), None);
    }

    #[test]
    fn test_upsert_through_registry() {
        let mut registry = Registry::new();
        let e = registry.create();
        assert_eq!(registry.upsert(e, Fuel { v: 1.0 }), Ok(ChangeKind::Construct));
        assert_eq!(registry.upsert(e, Fuel { v: 2.0 }), Ok(ChangeKind::Update));
        registry.patch::<Fuel>(e, |f| f.v *= 2.0).unwrap();
        assert_eq!(registry.get::<Fuel>(e), Some(Fuel { v: 4.0 }));
    }

    #[test]
    fn test_context_slot_lives_with_registry() {
        #[derive(Debug, PartialEq)]
        struct FrameBudget(u32);

        let mut registry = Registry::new();
        assert!(registry.context().try_get::<FrameBudget>().is_none());

        registry.context_mut().emplace(FrameBudget(16));
        registry.context_mut().get_mut::<FrameBudget>().0 += 1;
        assert_eq!(registry.context().get::<FrameBudget>(), &FrameBudget(17));
    }
}
