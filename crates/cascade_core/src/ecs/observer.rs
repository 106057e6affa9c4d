//! # Observers
//!
//! An observer accumulates the entities that satisfied a watch specification
//! since it was last drained.
//!
//! A specification is a list of [`Matcher`]s. Each matcher has one trigger
//! (a component type and the change kinds that count) plus optional guards:
//! `with` types the entity must currently hold and `without` types it must
//! not hold. Guards never add an entity by themselves; they filter.
//!
//! ## Set semantics
//!
//! The pending set holds each entity at most once, however many events it
//! produced between drains.
//!
//! ## Draining
//!
//! [`Observer::drain`] snapshots and clears in one call. Guards are checked
//! against the live stores at that point, so "currently holds" means "holds
//! when the batch is taken". Events raised while a batch is being processed
//! land in the (already cleared) pending set and are seen by the next drain.
//!
//! ## Eviction
//!
//! Destroying a matcher's trigger or `with` type clears that matcher's mark
//! on the entity. The entity leaves the pending set once no matcher's mark
//! is left. Losing a `without` type never evicts.
//!
//! ## Processing
//!
//! [`Observer::process`] is the form systems use: if the per-entity closure
//! fails or panics, every entity of the batch not yet processed (the failing
//! one included) goes back into the pending set.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::component::{Component, ComponentInfo};
use super::entity::EntityId;
use super::event::{ChangeEvent, ChangeKinds, ListenerId};
use super::registry::Registry;
use super::storage::ErasedStore;

/// Maximum number of matchers per observer.
pub const MAX_MATCHERS: usize = 64;

type EnsureStore = fn(&mut Registry) -> Arc<dyn ErasedStore>;

#[derive(Clone, Copy)]
struct Term {
    info: ComponentInfo,
    ensure: EnsureStore,
}

impl Term {
    fn of<C: Component>() -> Self {
        Self {
            info: ComponentInfo::of::<C>(),
            ensure: Registry::erased::<C>,
        }
    }
}

/// One clause of a watch specification.
///
/// # Example
///
/// ```rust,ignore
/// // "C1 constructed or updated while the entity has C2"
/// let m = Matcher::changed::<C1>().with::<C2>();
/// ```
#[derive(Clone)]
pub struct Matcher {
    trigger: Term,
    kinds: ChangeKinds,
    with: Vec<Term>,
    without: Vec<Term>,
}

impl Matcher {
    fn new<C: Component>(kinds: ChangeKinds) -> Self {
        Self {
            trigger: Term::of::<C>(),
            kinds,
            with: Vec::new(),
            without: Vec::new(),
        }
    }

    /// Fires when `C` is constructed or updated.
    #[must_use]
    pub fn changed<C: Component>() -> Self {
        Self::new::<C>(ChangeKinds::CHANGED)
    }

    /// Fires when `C` is constructed.
    #[must_use]
    pub fn constructed<C: Component>() -> Self {
        Self::new::<C>(ChangeKinds::CONSTRUCT)
    }

    /// Fires when `C` is updated.
    #[must_use]
    pub fn updated<C: Component>() -> Self {
        Self::new::<C>(ChangeKinds::UPDATE)
    }

    /// Requires the entity to hold `C`.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.with.push(Term::of::<C>());
        self
    }

    /// Requires the entity not to hold `C`.
    #[must_use]
    pub fn without<C: Component>(mut self) -> Self {
        self.without.push(Term::of::<C>());
        self
    }

    /// The triggering component type.
    #[must_use]
    pub fn trigger(&self) -> ComponentInfo {
        self.trigger.info
    }

    /// The change kinds that fire this matcher.
    #[must_use]
    pub fn kinds(&self) -> ChangeKinds {
        self.kinds
    }

    /// Types the entity must hold.
    pub fn required(&self) -> impl Iterator<Item = ComponentInfo> + '_ {
        self.with.iter().map(|term| term.info)
    }

    /// Types the entity must not hold.
    pub fn excluded(&self) -> impl Iterator<Item = ComponentInfo> + '_ {
        self.without.iter().map(|term| term.info)
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("trigger", &self.trigger.info)
            .field("kinds", &self.kinds)
            .field("with", &self.required().collect::<Vec<_>>())
            .field("without", &self.excluded().collect::<Vec<_>>())
            .finish()
    }
}

/// Guards of one matcher, bound to live stores.
struct BoundGuards {
    with: Vec<Arc<dyn ErasedStore>>,
    without: Vec<Arc<dyn ErasedStore>>,
}

impl BoundGuards {
    fn admits(&self, entity: EntityId) -> bool {
        self.with.iter().all(|store| store.contains(entity))
            && !self.without.iter().any(|store| store.contains(entity))
    }
}

/// Entity -> bitmask of the matchers that fired for it.
type PendingSet = IndexMap<EntityId, u64>;

/// Accumulates dirty entities from change events.
pub struct Observer {
    pending: Arc<Mutex<PendingSet>>,
    guards: Vec<BoundGuards>,
    matchers: Vec<Matcher>,
    subscriptions: Vec<(Arc<dyn ErasedStore>, ListenerId)>,
}

impl Observer {
    /// Creates an observer and connects it to the stores it watches.
    ///
    /// Stores for every trigger and guard type are created if absent.
    ///
    /// # Panics
    ///
    /// Panics if no matcher or more than [`MAX_MATCHERS`] matchers are given.
    pub fn new(registry: &mut Registry, matchers: impl IntoIterator<Item = Matcher>) -> Self {
        let matchers: Vec<Matcher> = matchers.into_iter().collect();
        assert!(!matchers.is_empty(), "observer needs at least one matcher");
        assert!(
            matchers.len() <= MAX_MATCHERS,
            "observer supports at most {MAX_MATCHERS} matchers"
        );

        let pending: Arc<Mutex<PendingSet>> = Arc::default();
        let mut subscriptions = Vec::new();
        let mut guards = Vec::with_capacity(matchers.len());
        // Store -> bits of the matchers that name it as trigger or `with`
        let mut evicting: Vec<(Arc<dyn ErasedStore>, u64)> = Vec::new();

        for (i, matcher) in matchers.iter().enumerate() {
            let bit = 1u64 << i;
            let trigger = (matcher.trigger.ensure)(registry);

            let sink = Arc::clone(&pending);
            let id = trigger.connect(
                matcher.kinds,
                Arc::new(move |event: &ChangeEvent| {
                    *sink.lock().entry(event.entity).or_insert(0) |= bit;
                }),
            );
            subscriptions.push((Arc::clone(&trigger), id));

            let with: Vec<_> = matcher.with.iter().map(|term| (term.ensure)(registry)).collect();
            let without: Vec<_> = matcher.without.iter().map(|term| (term.ensure)(registry)).collect();

            for store in std::iter::once(&trigger).chain(with.iter()) {
                match evicting.iter_mut().find(|(known, _)| known.info() == store.info()) {
                    Some((_, mask)) => *mask |= bit,
                    None => evicting.push((Arc::clone(store), bit)),
                }
            }
            guards.push(BoundGuards { with, without });
        }

        // Losing a trigger or required component clears the bits of the
        // matchers naming it; the entry goes once no bit is left
        for (store, mask) in evicting {
            let sink = Arc::clone(&pending);
            let id = store.connect(
                ChangeKinds::DESTROY,
                Arc::new(move |event: &ChangeEvent| {
                    let mut pending = sink.lock();
                    if let Some(fired) = pending.get_mut(&event.entity) {
                        *fired &= !mask;
                        if *fired == 0 {
                            pending.shift_remove(&event.entity);
                        }
                    }
                }),
            );
            subscriptions.push((store, id));
        }

        Self {
            pending,
            guards,
            matchers,
            subscriptions,
        }
    }

    /// The watch specification.
    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Number of pending entities (before guards are applied).
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Whether `entity` is pending.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.pending.lock().contains_key(&entity)
    }

    /// Discards every pending entity.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    fn admits(&self, entity: EntityId, fired: u64) -> bool {
        self.guards
            .iter()
            .enumerate()
            .any(|(i, guards)| fired & (1u64 << i) != 0 && guards.admits(entity))
    }

    fn take_batch(&self) -> Vec<(EntityId, u64)> {
        let taken = std::mem::take(&mut *self.pending.lock());
        taken
            .into_iter()
            .filter(|&(entity, fired)| self.admits(entity, fired))
            .collect()
    }

    /// Takes the pending set and clears it, applying guards.
    pub fn drain(&self) -> Vec<EntityId> {
        self.take_batch().into_iter().map(|(entity, _)| entity).collect()
    }

    /// Drains and runs `handle` for each entity.
    ///
    /// Returns the number of entities processed. On the first error the
    /// unprocessed rest of the batch, including the failing entity, is put
    /// back; the same happens if `handle` panics.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `handle`.
    pub fn process<E>(&self, mut handle: impl FnMut(EntityId) -> Result<(), E>) -> Result<usize, E> {
        let batch = self.take_batch();
        let mut requeue = Requeue {
            pending: &self.pending,
            batch: &batch,
            done: 0,
        };

        for &(entity, _) in &batch {
            handle(entity)?;
            requeue.done += 1;
        }

        Ok(batch.len())
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        for (store, id) in self.subscriptions.drain(..) {
            store.disconnect(id);
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("matchers", &self.matchers)
            .field("pending", &self.len())
            .finish()
    }
}

/// Puts the unprocessed tail of a batch back when dropped.
struct Requeue<'a> {
    pending: &'a Mutex<PendingSet>,
    batch: &'a [(EntityId, u64)],
    done: usize,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        let rest = &self.batch[self.done..];
        if rest.is_empty() {
            return;
        }

        tracing::debug!(requeued = rest.len(), "observer batch interrupted");
        let mut pending = self.pending.lock();
        for &(entity, fired) in rest {
            *pending.entry(entity).or_insert(0) |= fired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Input(f32);

    impl Component for Input {
        const NAME: &'static str = "Input";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Gate;

    impl Component for Gate {
        const NAME: &'static str = "Gate";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Muted;

    impl Component for Muted {
        const NAME: &'static str = "Muted";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Level(u8);

    impl Component for Level {
        const NAME: &'static str = "Level";
    }

    #[test]
    fn test_set_semantics() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>()]);
        let e = registry.create();

        registry.emplace(e, Input(1.0)).unwrap();
        registry.patch::<Input>(e, |i| i.0 = 2.0).unwrap();
        registry.patch::<Input>(e, |i| i.0 = 3.0).unwrap();

        assert_eq!(observer.len(), 1);
        assert_eq!(observer.drain(), vec![e]);
        assert!(observer.is_empty());
        assert!(observer.drain().is_empty());
    }

    #[test]
    fn test_kind_filter() {
        let mut registry = Registry::new();
        let updates = Observer::new(&mut registry, [Matcher::updated::<Input>()]);
        let constructs = Observer::new(&mut registry, [Matcher::constructed::<Input>()]);
        let e = registry.create();

        registry.emplace(e, Input(1.0)).unwrap();
        assert!(updates.is_empty());
        assert!(constructs.contains(e));

        constructs.clear();
        registry.patch::<Input>(e, |_| {}).unwrap();
        assert!(updates.contains(e));
        assert!(constructs.is_empty());
    }

    #[test]
    fn test_with_guard_filters_at_drain() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>().with::<Gate>()]);
        let gated = registry.create();
        let open = registry.create();

        registry.emplace(gated, Gate).unwrap();
        registry.emplace(gated, Input(1.0)).unwrap();
        registry.emplace(open, Input(1.0)).unwrap();

        assert_eq!(observer.drain(), vec![gated]);
    }

    #[test]
    fn test_without_guard() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>().without::<Muted>()]);
        let loud = registry.create();
        let muted = registry.create();
        registry.emplace(muted, Muted).unwrap();

        registry.emplace(loud, Input(0.0)).unwrap();
        registry.emplace(muted, Input(0.0)).unwrap();

        assert_eq!(observer.drain(), vec![loud]);
    }

    #[test]
    fn test_any_matcher_admits() {
        let mut registry = Registry::new();
        let observer = Observer::new(
            &mut registry,
            [
                Matcher::changed::<Input>().with::<Gate>(),
                Matcher::changed::<Gate>().with::<Input>(),
            ],
        );
        let e = registry.create();

        // Input first: guard fails at drain
        registry.emplace(e, Input(1.0)).unwrap();
        assert!(observer.drain().is_empty());

        // Gate arrives: second matcher fires, its guard holds
        registry.emplace(e, Gate).unwrap();
        assert_eq!(observer.drain(), vec![e]);
    }

    #[test]
    fn test_destroy_evicts_pending() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>()]);
        let e = registry.create();
        registry.emplace(e, Input(1.0)).unwrap();
        assert!(observer.contains(e));

        registry.destroy(e);
        assert!(!observer.contains(e));
        assert!(observer.drain().is_empty());
    }

    #[test]
    fn test_guard_loss_keeps_other_matchers() {
        let mut registry = Registry::new();
        let observer = Observer::new(
            &mut registry,
            [
                Matcher::changed::<Input>().with::<Gate>(),
                Matcher::changed::<Level>(),
            ],
        );
        let e = registry.create();
        registry.emplace(e, Gate).unwrap();
        registry.emplace(e, Input(1.0)).unwrap();
        registry.emplace(e, Level(0)).unwrap();
        observer.clear();

        registry.patch::<Input>(e, |i| i.0 = 2.0).unwrap();
        registry.patch::<Level>(e, |l| l.0 = 1).unwrap();
        registry.remove::<Gate>(e);

        // The first matcher lost its guard; the second still holds
        assert!(observer.contains(e));
        assert_eq!(observer.drain(), vec![e]);
    }

    #[test]
    fn test_guard_loss_evicts_when_nothing_else_fired() {
        let mut registry = Registry::new();
        let observer = Observer::new(
            &mut registry,
            [
                Matcher::changed::<Input>().with::<Gate>(),
                Matcher::changed::<Level>(),
            ],
        );
        let e = registry.create();
        registry.emplace(e, Gate).unwrap();
        registry.emplace(e, Input(1.0)).unwrap();

        registry.remove::<Gate>(e);
        assert!(!observer.contains(e));
    }

    #[test]
    fn test_process_requeues_on_error() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>()]);
        let a = registry.create();
        let b = registry.create();
        let c = registry.create();
        for e in [a, b, c] {
            registry.emplace(e, Input(0.0)).unwrap();
        }

        let mut seen = Vec::new();
        let result = observer.process(|e| {
            if e == b {
                return Err("boom");
            }
            seen.push(e);
            Ok(())
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(seen, vec![a]);
        assert!(!observer.contains(a));
        assert!(observer.contains(b));
        assert!(observer.contains(c));

        let processed = observer.process(|_| Ok::<(), &str>(())).unwrap();
        assert_eq!(processed, 2);
        assert!(observer.is_empty());
    }

    #[test]
    fn test_process_requeues_on_panic() {
        let mut registry = Registry::new();
        let observer = Observer::new(&mut registry, [Matcher::changed::<Input>()]);
        let e = registry.create();
        registry.emplace(e, Input(0.0)).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = observer.process(|_| -> Result<(), ()> { panic!("mid-batch") });
        }));

        assert!(outcome.is_err());
        assert!(observer.contains(e));
    }

    #[test]
    fn test_drop_disconnects() {
        let mut registry = Registry::new();
        let store = registry.erased::<Input>();
        {
            let observer = Observer::new(&mut registry, [Matcher::changed::<Input>().with::<Gate>()]);
            assert_eq!(observer.matchers().len(), 1);
            // trigger + eviction on Input
            assert_eq!(store.listener_count(), 2);
        }
        assert_eq!(store.listener_count(), 0);
        assert_eq!(registry.erased::<Gate>().listener_count(), 0);
    }
}
