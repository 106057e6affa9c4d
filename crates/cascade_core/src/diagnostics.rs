//! # Change Diagnostics
//!
//! A change log for debug panels: one row per (entity, component type),
//! with a description and the number of construct/update events seen.
//!
//! The log is filled by plain store listeners. Recording never touches a
//! component store, so it is safe to run inside the event path.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::ecs::{ChangeEvent, Component, ComponentInfo, EntityId, ListenerId, Registry};

/// One row of the change log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Description, written on first sight of the row.
    pub text: String,
    /// Construct and update events recorded for the row.
    pub count: u64,
}

/// Change log shared between listeners and a reader.
pub type SharedChangeLog = Arc<Mutex<ChangeLog>>;

/// Per-entity, per-component record of observed changes.
#[derive(Debug, Default)]
pub struct ChangeLog {
    rows: IndexMap<EntityId, IndexMap<ComponentInfo, ChangeRecord>>,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log ready to be shared.
    #[must_use]
    pub fn shared() -> SharedChangeLog {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Records one change of `component` on `entity`.
    pub fn record(&mut self, entity: EntityId, component: ComponentInfo) {
        let record = self
            .rows
            .entry(entity)
            .or_default()
            .entry(component)
            .or_insert_with(|| ChangeRecord {
                text: format!(
                    "Callback - Type: [{}] created or modified on entity: [{}]",
                    component.name(),
                    entity.index()
                ),
                count: 0,
            });
        record.count += 1;
    }

    /// All rows, grouped by entity in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = (EntityId, ComponentInfo, &ChangeRecord)> {
        self.rows.iter().flat_map(|(&entity, row)| {
            row.iter().map(move |(&component, record)| (entity, component, record))
        })
    }

    /// Events recorded for one row, zero if the row does not exist.
    #[must_use]
    pub fn count(&self, entity: EntityId, component: ComponentInfo) -> u64 {
        self.rows
            .get(&entity)
            .and_then(|row| row.get(&component))
            .map_or(0, |record| record.count)
    }

    /// Events recorded across all rows.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows
            .values()
            .flat_map(IndexMap::values)
            .map(|record| record.count)
            .sum()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.values().map(IndexMap::len).sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drops every row of `entity`. Returns whether it had any.
    pub fn forget(&mut self, entity: EntityId) -> bool {
        self.rows.shift_remove(&entity).is_some()
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// Records construct and update events of `C` into `log`.
///
/// Returns the construct and update listener IDs, in that order.
pub fn attach_change_log<C: Component>(
    registry: &mut Registry,
    log: &SharedChangeLog,
) -> [ListenerId; 2] {
    let points = [registry.on_construct::<C>(), registry.on_update::<C>()];
    points.map(|point| {
        let log = Arc::clone(log);
        point.connect(move |event: &ChangeEvent| log.lock().record(event.entity, event.component))
    })
}

/// Undoes [`attach_change_log`].
pub fn detach_change_log<C: Component>(registry: &mut Registry, listeners: [ListenerId; 2]) {
    let [construct, update] = listeners;
    registry.on_construct::<C>().disconnect(construct);
    registry.on_update::<C>().disconnect(update);
}
