//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the sparse arrays of every store
//! - A generation counter for safe reuse

use std::fmt;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the packed 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityId(null)")
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Hands out entity IDs and recycles freed slots.
///
/// A freed slot is reused with its generation bumped, so an ID held across
/// a destroy never matches the entity that later occupies the same slot.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    alive_count: usize,
}

impl EntityAllocator {
    /// Creates an allocator with room for `capacity` slots before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            alive_count: 0,
        }
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates a fresh entity ID.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX - 1` slots would be needed.
    pub fn allocate(&mut self) -> EntityId {
        self.alive_count += 1;

        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            // Increment generation to invalidate old references
            slot.generation = slot.generation.wrapping_add(1);
            slot.alive = true;
            return EntityId::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|&i| i != u32::MAX)
            .expect("entity index space exhausted");
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        EntityId::new(index, 0)
    }

    /// Frees an entity, returning its slot to the free list.
    ///
    /// Returns `false` if the ID was null, stale, or already dead.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.slots[id.index() as usize].alive = false;
        self.free_indices.push(id.index());
        self.alive_count -= 1;
        true
    }

    /// Checks if an entity is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }

        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Iterates over all alive entity IDs in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.alive
                .then(|| EntityId::new(index as u32, slot.generation))
        })
    }
}
