//! # Change Events
//!
//! Every successful store mutation raises exactly one [`ChangeEvent`],
//! synchronously, before the mutating call returns. Listeners connect to a
//! store's [`Signal`] for any subset of the three kinds.
//!
//! Listeners run while the firing store is locked for writing. A listener
//! must not lock or mutate that store; recording into its own state (an
//! observer's pending set, a change log) is the intended use.

use std::sync::Arc;

use super::component::ComponentInfo;
use super::entity::EntityId;

/// What happened to a store entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The entity gained the component.
    Construct,
    /// The component value was patched in place.
    Update,
    /// The component is about to be removed from the entity.
    Destroy,
}

impl ChangeKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Construct => 0b001,
            Self::Update => 0b010,
            Self::Destroy => 0b100,
        }
    }
}

/// A set of [`ChangeKind`]s a listener is interested in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChangeKinds(u8);

impl ChangeKinds {
    /// No kinds.
    pub const NONE: Self = Self(0);
    /// Construct only.
    pub const CONSTRUCT: Self = Self(0b001);
    /// Update only.
    pub const UPDATE: Self = Self(0b010);
    /// Destroy only.
    pub const DESTROY: Self = Self(0b100);
    /// Construct or update: "the value is new or changed".
    pub const CHANGED: Self = Self(0b011);
    /// Every kind.
    pub const ALL: Self = Self(0b111);

    /// Checks whether `kind` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Union of two sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl From<ChangeKind> for ChangeKinds {
    fn from(kind: ChangeKind) -> Self {
        Self(kind.bit())
    }
}

/// A single (entity, component type) change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The entity whose entry changed.
    pub entity: EntityId,
    /// The component type of the store that fired.
    pub component: ComponentInfo,
    /// Construct, update or destroy.
    pub kind: ChangeKind,
}

/// Handle returned by [`Signal::connect`], used to disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for each matching change event.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Ordered list of listeners attached to one store.
#[derive(Default)]
pub struct Signal {
    next_id: u64,
    listeners: Vec<(ListenerId, ChangeKinds, Listener)>,
}

impl Signal {
    /// Connects a listener for the given kinds.
    ///
    /// Listeners run in connection order.
    pub fn connect(&mut self, kinds: ChangeKinds, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kinds, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers an event to every listener interested in its kind.
    pub fn emit(&self, event: &ChangeEvent) {
        for (_, kinds, listener) in &self.listeners {
            if kinds.contains(event.kind) {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Component;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Tag;

    impl Component for Tag {
        const NAME: &'static str = "Tag";
    }

    fn event(kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            entity: EntityId::new(0, 0),
            component: ComponentInfo::of::<Tag>(),
            kind,
        }
    }

    #[test]
    fn test_kind_sets() {
        assert!(ChangeKinds::CHANGED.contains(ChangeKind::Construct));
        assert!(ChangeKinds::CHANGED.contains(ChangeKind::Update));
        assert!(!ChangeKinds::CHANGED.contains(ChangeKind::Destroy));
        assert_eq!(
            ChangeKinds::CONSTRUCT.union(ChangeKinds::UPDATE),
            ChangeKinds::CHANGED
        );
        assert!(!ChangeKinds::NONE.contains(ChangeKind::Update));
    }

    #[test]
    fn test_emit_filters_by_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut signal = Signal::default();
        let counter = Arc::clone(&hits);
        signal.connect(
            ChangeKinds::UPDATE,
            Arc::new(move |_: &ChangeEvent| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        );

        signal.emit(&event(ChangeKind::Construct));
        signal.emit(&event(ChangeKind::Update));
        signal.emit(&event(ChangeKind::Destroy));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disconnect() {
        let mut signal = Signal::default();
        let id = signal.connect(ChangeKinds::ALL, Arc::new(|_: &ChangeEvent| {}));
        assert_eq!(signal.len(), 1);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert!(signal.is_empty());
    }
}
