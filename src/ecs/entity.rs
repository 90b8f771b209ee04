use serde::{Deserialize, Serialize};

/// Opaque entity identifier.
///
/// Ids are slot indices: a destroyed entity's id is handed out again by the next
/// [`EntityManager::create_entity`].
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Entity(u32);

impl Entity {
    /// Marks "no entity", e.g. a player that has not been spawned yet.
    pub const INVALID: Entity = Entity(u32::MAX);

    /// Creates an entity id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Entity(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id as a slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `false` for [`Entity::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// Bitmask of the component kinds attached to an entity.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct EntityMask(u32);

impl EntityMask {
    /// Free slot.
    pub const EMPTY: EntityMask = EntityMask(0);
    /// Set on every live entity, whatever its components.
    pub const ALLOCATED: EntityMask = EntityMask(1 << 0);
    /// Has a [`Body`](crate::Body).
    pub const BODY: EntityMask = EntityMask(1 << 1);
    /// Has a [`BoxCollider`](crate::BoxCollider).
    pub const BOX: EntityMask = EntityMask(1 << 2);
    /// Has a [`Transform`](crate::Transform).
    pub const TRANSFORM: EntityMask = EntityMask(1 << 3);
    /// Has a [`PlayerCharacter`](crate::PlayerCharacter).
    pub const PLAYER_CHARACTER: EntityMask = EntityMask(1 << 4);
    /// Has a [`Ball`](crate::Ball).
    pub const BALL: EntityMask = EntityMask(1 << 5);
    /// Soft-deleted during speculation; removed for good at the next validation.
    pub const DESTROYED: EntityMask = EntityMask(1 << 6);

    /// Creates a mask from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        EntityMask(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: EntityMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EntityMask {
    type Output = EntityMask;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        EntityMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EntityMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for EntityMask {
    type Output = EntityMask;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        EntityMask(self.0 & rhs.0)
    }
}

impl std::ops::Not for EntityMask {
    type Output = EntityMask;

    #[inline]
    fn not(self) -> Self::Output {
        EntityMask(!self.0)
    }
}

/// Registry of live entities and their component masks.
///
/// # Examples
///
/// ```
/// use paddle_rollback::{EntityManager, EntityMask};
///
/// let mut entities = EntityManager::new();
/// let a = entities.create_entity();
/// let b = entities.create_entity();
/// entities.add_component(b, EntityMask::BODY | EntityMask::BALL);
/// assert!(entities.has_component(b, EntityMask::BALL));
///
/// entities.destroy_entity(a);
/// // the freed slot is reused first
/// assert_eq!(entities.create_entity(), a);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityManager {
    masks: Vec<EntityMask>,
}

impl EntityManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an entity in the lowest free slot.
    pub fn create_entity(&mut self) -> Entity {
        if let Some(index) = self.masks.iter().position(|mask| mask.is_empty()) {
            if let Some(mask) = self.masks.get_mut(index) {
                *mask = EntityMask::ALLOCATED;
            }
            // Slots never exceed u32::MAX - 1: ids come from the same counter.
            return Entity::new(index as u32);
        }
        let id = self.masks.len() as u32;
        self.masks.push(EntityMask::ALLOCATED);
        Entity::new(id)
    }

    /// Frees the entity's slot and drops every component bit. Unknown entities are ignored.
    pub fn destroy_entity(&mut self, entity: Entity) {
        if let Some(mask) = self.masks.get_mut(entity.index()) {
            *mask = EntityMask::EMPTY;
        }
    }

    /// Returns `true` if the entity is allocated.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.mask(entity).contains(EntityMask::ALLOCATED)
    }

    /// Returns the entity's mask, [`EntityMask::EMPTY`] for free or unknown slots.
    #[must_use]
    pub fn mask(&self, entity: Entity) -> EntityMask {
        self.masks
            .get(entity.index())
            .copied()
            .unwrap_or(EntityMask::EMPTY)
    }

    /// Sets the bits of `mask` on a live entity. Returns `false` if the entity is not alive.
    pub fn add_component(&mut self, entity: Entity, mask: EntityMask) -> bool {
        match self.masks.get_mut(entity.index()) {
            Some(current) if current.contains(EntityMask::ALLOCATED) => {
                *current |= mask;
                true
            },
            _ => false,
        }
    }

    /// Clears the bits of `mask`. The allocation bit itself is never cleared here.
    pub fn remove_component(&mut self, entity: Entity, mask: EntityMask) {
        if let Some(current) = self.masks.get_mut(entity.index()) {
            if current.contains(EntityMask::ALLOCATED) {
                *current = (*current & !mask) | EntityMask::ALLOCATED;
            }
        }
    }

    /// Returns `true` if the entity is alive and carries every bit of `mask`.
    #[must_use]
    pub fn has_component(&self, entity: Entity, mask: EntityMask) -> bool {
        let current = self.mask(entity);
        current.contains(EntityMask::ALLOCATED) && current.contains(mask)
    }

    /// Live entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities_with(EntityMask::ALLOCATED)
    }

    /// Live entities carrying every bit of `mask`, in ascending id order.
    pub fn entities_with(&self, mask: EntityMask) -> impl Iterator<Item = Entity> + '_ {
        let required = mask | EntityMask::ALLOCATED;
        self.masks
            .iter()
            .enumerate()
            .filter(move |(_, current)| current.contains(required))
            .map(|(index, _)| Entity::new(index as u32))
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities().count()
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots ever allocated, live or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.masks.len()
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
    fn ids_are_allocated_in_order() {
        let mut entities = EntityManager::new();
        assert_eq!(entities.create_entity(), Entity::new(0));
        assert_eq!(entities.create_entity(), Entity::new(1));
        assert_eq!(entities.create_entity(), Entity::new(2));
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn lowest_free_slot_is_reused() {
        let mut entities = EntityManager::new();
        let ids: Vec<_> = (0..4).map(|_| entities.create_entity()).collect();
        entities.destroy_entity(ids[2]);
        entities.destroy_entity(ids[1]);
        assert_eq!(entities.create_entity(), ids[1]);
        assert_eq!(entities.create_entity(), ids[2]);
        assert_eq!(entities.create_entity(), Entity::new(4));
    }

    #[test]
    fn destroyed_entity_loses_all_components() {
        let mut entities = EntityManager::new();
        let entity = entities.create_entity();
        entities.add_component(entity, EntityMask::BODY | EntityMask::BOX);
        entities.destroy_entity(entity);
        assert!(!entities.is_alive(entity));
        assert!(!entities.has_component(entity, EntityMask::BODY));
        assert!(entities.is_empty());
    }

    #[test]
    fn add_component_requires_live_entity() {
        let mut entities = EntityManager::new();
        assert!(!entities.add_component(Entity::new(3), EntityMask::BALL));
        assert!(!entities.add_component(Entity::INVALID, EntityMask::BALL));
        assert_eq!(entities.capacity(), 0);
    }

    #[test]
    fn remove_component_keeps_entity_alive() {
        let mut entities = EntityManager::new();
        let entity = entities.create_entity();
        entities.add_component(entity, EntityMask::DESTROYED | EntityMask::BALL);
        entities.remove_component(entity, EntityMask::DESTROYED);
        assert!(entities.is_alive(entity));
        assert!(entities.has_component(entity, EntityMask::BALL));
        assert!(!entities.has_component(entity, EntityMask::DESTROYED));

        entities.remove_component(entity, EntityMask::ALLOCATED);
        assert!(entities.is_alive(entity));
    }

    #[test]
    fn has_component_requires_every_bit() {
        let mut entities = EntityManager::new();
        let entity = entities.create_entity();
        entities.add_component(entity, EntityMask::BODY);
        assert!(entities.has_component(entity, EntityMask::BODY));
        assert!(!entities.has_component(entity, EntityMask::BODY | EntityMask::TRANSFORM));
    }

    #[test]
    fn entities_with_filters_and_sorts() {
        let mut entities = EntityManager::new();
        let a = entities.create_entity();
        let b = entities.create_entity();
        let c = entities.create_entity();
        entities.add_component(c, EntityMask::BALL);
        entities.add_component(a, EntityMask::BALL);
        entities.add_component(b, EntityMask::PLAYER_CHARACTER);
        let balls: Vec<_> = entities.entities_with(EntityMask::BALL).collect();
        assert_eq!(balls, vec![a, c]);
        let all: Vec<_> = entities.entities().collect();
        assert_eq!(all, vec![a, b, c]);
    }

    #[test]
    fn invalid_entity_display() {
        assert_eq!(Entity::INVALID.to_string(), "invalid");
        assert_eq!(Entity::new(7).to_string(), "7");
        assert_eq!(Entity::default(), Entity::INVALID);
    }
}
