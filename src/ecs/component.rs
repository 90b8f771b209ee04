use serde::{Deserialize, Serialize};

use super::{Entity, EntityMask};

/// A value type stored in a [`ComponentTable`], bound to its registry bit.
pub trait Component: Clone + Default {
    /// Bit set in the [`EntityManager`](super::EntityManager) while an entity carries this
    /// component.
    const MASK: EntityMask;
}

/// Sparse storage of one component kind, indexed by entity id.
///
/// Tables are plain data: copying one track into another is a single [`copy_from`] per table.
///
/// [`copy_from`]: ComponentTable::copy_from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentTable<C> {
    slots: Vec<Option<C>>,
}

// Trailing empty slots are an allocation detail and do not take part in equality.
impl<C: Clone + Default + PartialEq> PartialEq for ComponentTable<C> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<C> Default for ComponentTable<C> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<C: Clone + Default> ComponentTable<C> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a default value to `entity`, keeping any existing value.
    pub fn add(&mut self, entity: Entity) {
        if let Some(slot) = self.slot_mut(entity) {
            if slot.is_none() {
                *slot = Some(C::default());
            }
        }
    }

    /// Attaches `value` to `entity`, replacing any existing value.
    pub fn set(&mut self, entity: Entity, value: C) {
        if let Some(slot) = self.slot_mut(entity) {
            *slot = Some(value);
        }
    }

    /// Detaches the entity's value and returns it.
    pub fn remove(&mut self, entity: Entity) -> Option<C> {
        self.slots.get_mut(entity.index()).and_then(Option::take)
    }

    /// Returns `true` if the entity has a value in this table.
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Returns the entity's value.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&C> {
        self.slots.get(entity.index()).and_then(Option::as_ref)
    }

    /// Returns the entity's value mutably.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut C> {
        self.slots.get_mut(entity.index()).and_then(Option::as_mut)
    }

    /// Entities with a value, in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.iter().map(|(entity, _)| entity)
    }

    /// `(entity, value)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &C)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|c| (Entity::new(index as u32), c)))
    }

    /// Number of entities with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns `true` if no entity has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Overwrites this table with the content of `other`. Values present here but absent from
    /// `other` are dropped.
    pub fn copy_from(&mut self, other: &Self) {
        self.slots.clone_from(&other.slots);
    }

    fn slot_mut(&mut self, entity: Entity) -> Option<&mut Option<C>> {
        if !entity.is_valid() {
            return None;
        }
        let index = entity.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots.get_mut(index)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn add_uses_default_and_keeps_existing() {
        let mut table = ComponentTable::<u32>::new();
        table.add(Entity::new(2));
        assert_eq!(table.get(Entity::new(2)), Some(&0));
        table.set(Entity::new(2), 7);
        table.add(Entity::new(2));
        assert_eq!(table.get(Entity::new(2)), Some(&7));
        assert!(!table.has(Entity::new(0)));
    }

    #[test]
    fn remove_returns_value() {
        let mut table = ComponentTable::<u32>::new();
        table.set(Entity::new(0), 3);
        assert_eq!(table.remove(Entity::new(0)), Some(3));
        assert_eq!(table.remove(Entity::new(0)), None);
        assert_eq!(table.remove(Entity::new(40)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn invalid_entity_is_never_stored() {
        let mut table = ComponentTable::<u32>::new();
        table.set(Entity::INVALID, 1);
        assert!(table.is_empty());
        assert!(!table.has(Entity::INVALID));
    }

    #[test]
    fn entities_are_ascending() {
        let mut table = ComponentTable::<u32>::new();
        table.set(Entity::new(5), 50);
        table.set(Entity::new(1), 10);
        table.set(Entity::new(3), 30);
        let ids: Vec<u32> = table.entities().map(Entity::as_u32).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn copy_from_is_a_total_overwrite() {
        let mut source = ComponentTable::<u32>::new();
        source.set(Entity::new(0), 1);

        let mut target = ComponentTable::<u32>::new();
        target.set(Entity::new(0), 9);
        target.set(Entity::new(4), 4);

        target.copy_from(&source);
        assert_eq!(target, source);
        assert!(!target.has(Entity::new(4)));
    }

    #[test]
    fn get_mut_edits_in_place() {
        let mut table = ComponentTable::<u32>::new();
        table.set(Entity::new(1), 1);
        *table.get_mut(Entity::new(1)).unwrap() += 1;
        assert_eq!(table.get(Entity::new(1)), Some(&2));
    }
}
