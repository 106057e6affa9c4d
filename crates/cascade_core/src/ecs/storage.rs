//! # Component Storage
//!
//! One sparse-set store per component type, with change signals.
//!
//! The storage uses a sparse-set strategy:
//! - `sparse` maps an entity index to a slot in the dense arrays
//! - Dense arrays hold the owning `EntityId` and the value side by side
//! - Access is O(1) by entity; iteration walks contiguous memory
//!
//! Keys include the generation, so a stale handle never matches an entity
//! that later reuses the same slot.
//!
//! Stores are shared as `Arc<RwLock<ComponentStore<C>>>`. Three handle types
//! wrap that one instance:
//! - [`StoreHandle`] - full access, returned by the registry
//! - [`ReadStore`] - shared read access only, bound into systems for inputs
//! - [`WriteStore`] - read and write, bound into systems for outputs

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::component::{Component, ComponentInfo};
use super::entity::EntityId;
use super::event::{ChangeEvent, ChangeKind, ChangeKinds, Listener, ListenerId, Signal};
use crate::error::{EcsError, EcsResult};

/// Storage for a single component type.
///
/// This storage guarantees:
/// - At most one value per entity
/// - Exactly one change event per successful mutation
/// - Events are raised after the mutation is visible, before the call returns
///
/// # Example
///
/// ```rust,ignore
/// let mut store: ComponentStore<Health> = ComponentStore::new();
/// store.emplace(entity, Health { v: 1.0 })?;
/// store.patch(entity, |h| h.v -= 0.5)?;
/// ```
pub struct ComponentStore<C: Component> {
    /// Entity index -> dense slot.
    sparse: Vec<Option<u32>>,
    /// Dense array of owners, parallel to `values`.
    entities: Vec<EntityId>,
    /// Dense array of component values.
    values: Vec<C>,
    signal: Signal,
    info: ComponentInfo,
    trace_events: bool,
}

impl<C: Component> ComponentStore<C> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty store with room for `capacity` values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sparse: Vec::with_capacity(capacity),
            entities: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            signal: Signal::default(),
            info: ComponentInfo::of::<C>(),
            trace_events: false,
        }
    }

    /// Emits a `trace!` line for every event this store raises.
    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace_events = enabled;
    }

    /// The component type held by this store.
    #[inline]
    #[must_use]
    pub fn info(&self) -> ComponentInfo {
        self.info
    }

    /// Number of entities holding this component.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity holds this component.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    fn dense_index(&self, entity: EntityId) -> Option<usize> {
        let dense = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.entities[dense] == entity).then_some(dense)
    }

    /// Checks whether `entity` holds this component.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.dense_index(entity).is_some()
    }

    /// Gets the component of `entity`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity does not hold the component.
    pub fn get(&self, entity: EntityId) -> EcsResult<&C> {
        self.try_get(entity).ok_or(EcsError::NotFound {
            entity,
            component: C::NAME,
        })
    }

    /// Gets the component of `entity`, or `None` if absent.
    #[inline]
    #[must_use]
    pub fn try_get(&self, entity: EntityId) -> Option<&C> {
        self.dense_index(entity).map(|dense| &self.values[dense])
    }

    /// Inserts a component for an entity that does not hold one yet.
    ///
    /// Raises a `Construct` event.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the entity already holds the component. Callers
    /// that may see either case use [`ComponentStore::upsert`].
    ///
    /// # Panics
    ///
    /// Panics if the store would exceed `u32::MAX` entries.
    pub fn emplace(&mut self, entity: EntityId, value: C) -> EcsResult<()> {
        if self.contains(entity) {
            return Err(EcsError::AlreadyExists {
                entity,
                component: C::NAME,
            });
        }

        let index = entity.index() as usize;
        // A stale owner of the same slot is evicted first
        if let Some(&Some(dense)) = self.sparse.get(index) {
            let stale = self.entities[dense as usize];
            self.remove(stale);
        }

        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        let dense = u32::try_from(self.entities.len()).expect("component store overflow");
        self.sparse[index] = Some(dense);
        self.entities.push(entity);
        self.values.push(value);

        self.fire(entity, ChangeKind::Construct);
        Ok(())
    }

    /// Mutates the component of `entity` in place.
    ///
    /// Raises an `Update` event after `mutate` returns.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity does not hold the component.
    pub fn patch(&mut self, entity: EntityId, mutate: impl FnOnce(&mut C)) -> EcsResult<()> {
        let dense = self.dense_index(entity).ok_or(EcsError::NotFound {
            entity,
            component: C::NAME,
        })?;

        mutate(&mut self.values[dense]);

        self.fire(entity, ChangeKind::Update);
        Ok(())
    }

    /// Overwrites the component of `entity`. A `patch` that assigns.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity does not hold the component.
    pub fn replace(&mut self, entity: EntityId, value: C) -> EcsResult<()> {
        self.patch(entity, |slot| *slot = value)
    }

    /// Writes `value`: patch if present, emplace otherwise.
    ///
    /// This is the write discipline every system uses. Returns which event
    /// was raised.
    pub fn upsert(&mut self, entity: EntityId, value: C) -> ChangeKind {
        if let Some(dense) = self.dense_index(entity) {
            self.values[dense] = value;
            self.fire(entity, ChangeKind::Update);
            ChangeKind::Update
        } else {
            // Absent was just checked, emplace cannot fail
            let _ = self.emplace(entity, value);
            ChangeKind::Construct
        }
    }

    /// Removes the component of `entity`.
    ///
    /// Raises a `Destroy` event while the value is still readable, then
    /// swap-removes it. Returns `None` if the entity did not hold it.
    pub fn remove(&mut self, entity: EntityId) -> Option<C> {
        let dense = self.dense_index(entity)?;

        self.fire(entity, ChangeKind::Destroy);

        self.sparse[entity.index() as usize] = None;
        self.entities.swap_remove(dense);
        let value = self.values.swap_remove(dense);

        // Patch the sparse entry of the entity that moved into `dense`
        if let Some(&moved) = self.entities.get(dense) {
            #[allow(clippy::cast_possible_truncation)]
            let slot = dense as u32;
            self.sparse[moved.index() as usize] = Some(slot);
        }

        Some(value)
    }

    /// Iterates over `(entity, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &C)> {
        self.entities.iter().copied().zip(self.values.iter())
    }

    /// All entities holding this component, in dense order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Connects a listener for the given kinds.
    pub fn connect(&mut self, kinds: ChangeKinds, listener: Listener) -> ListenerId {
        self.signal.connect(kinds, listener)
    }

    /// Disconnects a listener.
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        self.signal.disconnect(id)
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.signal.len()
    }

    fn fire(&self, entity: EntityId, kind: ChangeKind) {
        if self.trace_events {
            tracing::trace!(component = C::NAME, entity = %entity, ?kind, "change event");
        }
        self.signal.emit(&ChangeEvent {
            entity,
            component: self.info,
            kind,
        });
    }
}

impl<C: Component> Default for ComponentStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> std::fmt::Debug for ComponentStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("component", &self.info)
            .field("len", &self.len())
            .field("signal", &self.signal)
            .finish()
    }
}

// =============================================================================
// Type-erased access
// =============================================================================

/// Object-safe view of a store, independent of its component type.
///
/// The registry uses it to destroy entities across every store; observers
/// use it to subscribe and to evaluate guards.
pub trait ErasedStore: Send + Sync {
    /// The component type held by the store.
    fn info(&self) -> ComponentInfo;

    /// Checks whether `entity` holds the component.
    fn contains(&self, entity: EntityId) -> bool;

    /// Removes the entity's entry, raising `Destroy`. Returns whether one
    /// existed.
    fn remove_entity(&self, entity: EntityId) -> bool;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entities holding the component.
    fn entities(&self) -> Vec<EntityId>;

    /// Connects a listener.
    fn connect(&self, kinds: ChangeKinds, listener: Listener) -> ListenerId;

    /// Disconnects a listener.
    fn disconnect(&self, id: ListenerId) -> bool;

    /// Number of connected listeners.
    fn listener_count(&self) -> usize;

    /// Toggles per-event tracing.
    fn set_trace_events(&self, enabled: bool);
}

impl<C: Component> ErasedStore for RwLock<ComponentStore<C>> {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::of::<C>()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.read().contains(entity)
    }

    fn remove_entity(&self, entity: EntityId) -> bool {
        self.write().remove(entity).is_some()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn entities(&self) -> Vec<EntityId> {
        self.read().entities().to_vec()
    }

    fn connect(&self, kinds: ChangeKinds, listener: Listener) -> ListenerId {
        self.write().connect(kinds, listener)
    }

    fn disconnect(&self, id: ListenerId) -> bool {
        self.write().disconnect(id)
    }

    fn listener_count(&self) -> usize {
        self.read().listener_count()
    }

    fn set_trace_events(&self, enabled: bool) {
        self.write().set_trace_events(enabled);
    }
}

/// Subscription point for one kind of change on one store.
///
/// Returned by `on_construct`/`on_update`/`on_destroy` on a [`StoreHandle`]
/// or the registry; both routes connect to the same signal.
pub struct SignalPoint {
    store: Arc<dyn ErasedStore>,
    kinds: ChangeKinds,
}

impl SignalPoint {
    pub(crate) fn new(store: Arc<dyn ErasedStore>, kinds: ChangeKinds) -> Self {
        Self { store, kinds }
    }

    /// Connects `callback` to this point.
    ///
    /// The callback must not touch component stores; see the module docs of
    /// [`crate::ecs::event`].
    pub fn connect<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.store.connect(self.kinds, Arc::new(callback))
    }

    /// Disconnects a listener previously connected on this store.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.store.disconnect(id)
    }
}

// =============================================================================
// Handles
// =============================================================================

pub(crate) type Shared<C> = Arc<RwLock<ComponentStore<C>>>;

/// Full-access handle to a store, as returned by the registry.
///
/// This is the route an external collaborator (a debug panel) uses to read,
/// create and edit values; every mutation goes through the same change path
/// as a system's.
pub struct StoreHandle<C: Component> {
    inner: Shared<C>,
}

impl<C: Component> StoreHandle<C> {
    pub(crate) fn from_shared(inner: Shared<C>) -> Self {
        Self { inner }
    }

    /// Locks the store for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, ComponentStore<C>> {
        self.inner.read()
    }

    /// Locks the store for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, ComponentStore<C>> {
        self.inner.write()
    }

    /// Checks whether `entity` holds the component.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.inner.read().contains(entity)
    }

    /// Copies the component of `entity` out, or `None` if absent.
    pub fn get(&self, entity: EntityId) -> Option<C> {
        self.inner.read().try_get(entity).cloned()
    }

    /// See [`ComponentStore::emplace`].
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the entity already holds the component.
    pub fn emplace(&self, entity: EntityId, value: C) -> EcsResult<()> {
        self.inner.write().emplace(entity, value)
    }

    /// See [`ComponentStore::patch`].
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity does not hold the component.
    pub fn patch(&self, entity: EntityId, mutate: impl FnOnce(&mut C)) -> EcsResult<()> {
        self.inner.write().patch(entity, mutate)
    }

    /// See [`ComponentStore::upsert`].
    pub fn upsert(&self, entity: EntityId, value: C) -> ChangeKind {
        self.inner.write().upsert(entity, value)
    }

    /// See [`ComponentStore::remove`].
    pub fn remove(&self, entity: EntityId) -> Option<C> {
        self.inner.write().remove(entity)
    }

    /// Subscription point for construct events.
    pub fn on_construct(&self) -> SignalPoint {
        SignalPoint::new(self.erased(), ChangeKinds::CONSTRUCT)
    }

    /// Subscription point for update events.
    pub fn on_update(&self) -> SignalPoint {
        SignalPoint::new(self.erased(), ChangeKinds::UPDATE)
    }

    /// Subscription point for destroy events.
    pub fn on_destroy(&self) -> SignalPoint {
        SignalPoint::new(self.erased(), ChangeKinds::DESTROY)
    }

    /// Narrows this handle to read-only access.
    pub fn read_only(&self) -> ReadStore<C> {
        ReadStore {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Narrows this handle to read/write access without signal control.
    pub fn writable(&self) -> WriteStore<C> {
        WriteStore {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The type-erased view of the same store.
    pub fn erased(&self) -> Arc<dyn ErasedStore> {
        Arc::clone(&self.inner) as Arc<dyn ErasedStore>
    }
}

impl<C: Component> Clone for StoreHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only handle bound into a system for a declared input.
///
/// Exposes no mutating operation.
pub struct ReadStore<C: Component> {
    inner: Shared<C>,
}

impl<C: Component> ReadStore<C> {
    /// Locks the store for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, ComponentStore<C>> {
        self.inner.read()
    }

    /// Checks whether `entity` holds the component.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.inner.read().contains(entity)
    }

    /// Copies the component of `entity` out, or `None` if absent.
    pub fn get(&self, entity: EntityId) -> Option<C> {
        self.inner.read().try_get(entity).cloned()
    }

    /// Borrows the component of a dirty entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not hold the component. A system is only
    /// triggered for entities whose declared inputs exist, so an absent
    /// input means the observer or the access list is mis-specified.
    pub fn expect(&self, entity: EntityId) -> MappedRwLockReadGuard<'_, C> {
        RwLockReadGuard::map(self.inner.read(), |store| match store.try_get(entity) {
            Some(value) => value,
            None => panic!(
                "precondition violated: entity {entity:?} has no {} but it is a declared input",
                C::NAME
            ),
        })
    }

    /// Number of entities holding the component.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no entity holds the component.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<C: Component> Clone for ReadStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read/write handle bound into a system for a declared output.
pub struct WriteStore<C: Component> {
    inner: Shared<C>,
}

impl<C: Component> WriteStore<C> {
    /// Locks the store for reading (read-before-write on an output).
    pub fn read(&self) -> RwLockReadGuard<'_, ComponentStore<C>> {
        self.inner.read()
    }

    /// Locks the store for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, ComponentStore<C>> {
        self.inner.write()
    }

    /// Checks whether `entity` holds the component.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.inner.read().contains(entity)
    }

    /// Copies the component of `entity` out, or `None` if absent.
    pub fn get(&self, entity: EntityId) -> Option<C> {
        self.inner.read().try_get(entity).cloned()
    }

    /// See [`ComponentStore::upsert`].
    pub fn upsert(&self, entity: EntityId, value: C) -> ChangeKind {
        self.inner.write().upsert(entity, value)
    }

    /// See [`ComponentStore::patch`].
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity does not hold the component.
    pub fn patch(&self, entity: EntityId, mutate: impl FnOnce(&mut C)) -> EcsResult<()> {
        self.inner.write().patch(entity, mutate)
    }

    /// See [`ComponentStore::emplace`].
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the entity already holds the component.
    pub fn emplace(&self, entity: EntityId, value: C) -> EcsResult<()> {
        self.inner.write().emplace(entity, value)
    }
}

impl<C: Component> Clone for WriteStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
