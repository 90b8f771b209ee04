//! Fixed-timestep physics for one simulation track.
//!
//! Bodies move in straight lines: `position += velocity * dt`, nothing else. Colliders are
//! axis-aligned boxes centered on their body and never push each other apart. Overlaps are
//! only *reported*, as [`TriggerPair`]s, and the gameplay rules decide what they mean.
//!
//! Every pass visits entities in ascending id order and uses nothing but `f32` additions and
//! multiplications, so the same tables stepped with the same `dt` give bit-identical results
//! on every node.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ecs::{Component, ComponentTable, Entity, EntityMask};

/// Position and velocity of a simulated entity.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    /// Center of the body, in arena units.
    pub position: Vec2,
    /// Units per second.
    pub velocity: Vec2,
}

impl Component for Body {
    const MASK: EntityMask = EntityMask::BODY;
}

/// Axis-aligned box collider, centered on the entity's [`Body`].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxCollider {
    /// Half width and half height.
    pub extends: Vec2,
}

impl Component for BoxCollider {
    const MASK: EntityMask = EntityMask::BOX;
}

/// An unordered pair of overlapping colliders, stored as `(lower id, higher id)`.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TriggerPair {
    /// The entity with the lower id.
    pub first: Entity,
    /// The entity with the higher id.
    pub second: Entity,
}

impl TriggerPair {
    /// Creates a pair, ordering the entities by id.
    #[must_use]
    pub fn new(a: Entity, b: Entity) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Returns `true` if `entity` is part of the pair.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.first == entity || self.second == entity
    }
}

/// Trigger pairs produced by a single step. Rarely more than one.
pub type TriggerPairs = SmallVec<[TriggerPair; 4]>;

/// Bodies, colliders and the overlaps of the previous step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsManager {
    bodies: ComponentTable<Body>,
    boxes: ComponentTable<BoxCollider>,
    /// Pairs overlapping after the last step, sorted.
    contacts: Vec<TriggerPair>,
}

impl PhysicsManager {
    /// Creates an empty physics world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body at rest at the origin.
    pub fn add_body(&mut self, entity: Entity) {
        self.bodies.add(entity);
    }

    /// Sets (or adds) the entity's body.
    pub fn set_body(&mut self, entity: Entity, body: Body) {
        self.bodies.set(entity, body);
    }

    /// Returns the entity's body.
    #[must_use]
    pub fn body(&self, entity: Entity) -> Option<&Body> {
        self.bodies.get(entity)
    }

    /// Returns the entity's body mutably.
    pub fn body_mut(&mut self, entity: Entity) -> Option<&mut Body> {
        self.bodies.get_mut(entity)
    }

    /// Adds a zero-sized collider.
    pub fn add_box(&mut self, entity: Entity) {
        self.boxes.add(entity);
    }

    /// Sets (or adds) the entity's collider.
    pub fn set_box(&mut self, entity: Entity, collider: BoxCollider) {
        self.boxes.set(entity, collider);
    }

    /// Returns the entity's collider.
    #[must_use]
    pub fn collider(&self, entity: Entity) -> Option<&BoxCollider> {
        self.boxes.get(entity)
    }

    /// The body table.
    #[must_use]
    pub fn bodies(&self) -> &ComponentTable<Body> {
        &self.bodies
    }

    pub(crate) fn bodies_mut(&mut self) -> &mut ComponentTable<Body> {
        &mut self.bodies
    }

    /// The collider table.
    #[must_use]
    pub fn boxes(&self) -> &ComponentTable<BoxCollider> {
        &self.boxes
    }

    pub(crate) fn boxes_mut(&mut self) -> &mut ComponentTable<BoxCollider> {
        &mut self.boxes
    }

    /// Pairs that overlapped at the end of the last step, in ascending order.
    #[must_use]
    pub fn contacts(&self) -> &[TriggerPair] {
        &self.contacts
    }

    /// Drops everything attached to `entity`, including its contacts.
    pub fn remove_entity(&mut self, entity: Entity) {
        self.bodies.remove(entity);
        self.boxes.remove(entity);
        self.contacts.retain(|pair| !pair.contains(entity));
    }

    /// Overwrites bodies, colliders and contacts with those of `other`.
    pub fn copy_from(&mut self, other: &PhysicsManager) {
        self.bodies.copy_from(&other.bodies);
        self.boxes.copy_from(&other.boxes);
        self.contacts.clone_from(&other.contacts);
    }

    /// Advances every body by `dt` seconds, then returns the pairs of colliders that overlap
    /// now but did not after the previous step, in ascending order.
    pub fn fixed_update(&mut self, dt: f32) -> TriggerPairs {
        let entities: SmallVec<[Entity; 8]> = self.bodies.entities().collect();
        for entity in entities {
            if let Some(body) = self.bodies.get_mut(entity) {
                body.position += body.velocity * dt;
            }
        }

        let shapes: SmallVec<[(Entity, Vec2, Vec2); 8]> = self
            .boxes
            .iter()
            .filter_map(|(entity, collider)| {
                self.bodies
                    .get(entity)
                    .map(|body| (entity, body.position, collider.extends))
            })
            .collect();

        let mut overlapping = Vec::new();
        for (index, &(a, a_center, a_extends)) in shapes.iter().enumerate() {
            for &(b, b_center, b_extends) in shapes.iter().skip(index + 1) {
                if boxes_overlap(a_center, a_extends, b_center, b_extends) {
                    overlapping.push(TriggerPair::new(a, b));
                }
            }
        }

        let entered = overlapping
            .iter()
            .filter(|pair| self.contacts.binary_search(pair).is_err())
            .copied()
            .collect();
        self.contacts = overlapping;
        entered
    }
}

/// Strict AABB test: touching edges do not overlap.
#[must_use]
pub fn boxes_overlap(a_center: Vec2, a_extends: Vec2, b_center: Vec2, b_extends: Vec2) -> bool {
    let distance = (a_center - b_center).abs();
    let reach = a_extends + b_extends;
    distance.x < reach.x && distance.y < reach.y
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn e(id: u32) -> Entity {
        Entity::new(id)
    }

    fn boxed(physics: &mut PhysicsManager, entity: Entity, position: Vec2, velocity: Vec2) {
        physics.set_body(entity, Body { position, velocity });
        physics.set_box(
            entity,
            BoxCollider {
                extends: Vec2::splat(0.5),
            },
        );
    }

    #[test]
    fn integrates_velocity_with_fixed_period() {
        let mut physics = PhysicsManager::new();
        physics.set_body(
            e(0),
            Body {
                position: Vec2::new(1.0, 2.0),
                velocity: Vec2::new(10.0, -5.0),
            },
        );
        let pairs = physics.fixed_update(0.5);
        assert!(pairs.is_empty());
        let body = physics.body(e(0)).unwrap();
        assert_eq!(body.position, Vec2::new(6.0, -0.5));
        assert_eq!(body.velocity, Vec2::new(10.0, -5.0));
    }

    #[test]
    fn new_overlaps_are_reported_once() {
        let mut physics = PhysicsManager::new();
        boxed(&mut physics, e(0), Vec2::ZERO, Vec2::ZERO);
        boxed(&mut physics, e(1), Vec2::new(0.5, 0.0), Vec2::ZERO);

        let pairs = physics.fixed_update(0.02);
        assert_eq!(pairs.as_slice(), &[TriggerPair::new(e(0), e(1))]);

        // still overlapping, nothing new
        assert!(physics.fixed_update(0.02).is_empty());
        assert_eq!(physics.contacts(), &[TriggerPair::new(e(0), e(1))]);
    }

    #[test]
    fn separated_pair_triggers_again_on_reentry() {
        let mut physics = PhysicsManager::new();
        boxed(&mut physics, e(0), Vec2::ZERO, Vec2::ZERO);
        boxed(&mut physics, e(1), Vec2::new(0.5, 0.0), Vec2::ZERO);
        assert_eq!(physics.fixed_update(1.0).len(), 1);

        physics.body_mut(e(1)).unwrap().position = Vec2::new(5.0, 0.0);
        assert!(physics.fixed_update(1.0).is_empty());
        assert!(physics.contacts().is_empty());

        physics.body_mut(e(1)).unwrap().position = Vec2::new(0.2, 0.0);
        assert_eq!(physics.fixed_update(1.0).len(), 1);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        assert!(!boxes_overlap(
            Vec2::ZERO,
            Vec2::splat(0.5),
            Vec2::new(1.0, 0.0),
            Vec2::splat(0.5)
        ));
        assert!(boxes_overlap(
            Vec2::ZERO,
            Vec2::splat(0.5),
            Vec2::new(0.99, 0.99),
            Vec2::splat(0.5)
        ));
    }

    #[test]
    fn pairs_are_ordered_by_id() {
        let mut physics = PhysicsManager::new();
        boxed(&mut physics, e(3), Vec2::ZERO, Vec2::ZERO);
        boxed(&mut physics, e(1), Vec2::new(0.1, 0.0), Vec2::ZERO);
        boxed(&mut physics, e(2), Vec2::new(0.2, 0.0), Vec2::ZERO);
        let pairs = physics.fixed_update(0.02);
        assert_eq!(
            pairs.as_slice(),
            &[
                TriggerPair::new(e(1), e(2)),
                TriggerPair::new(e(1), e(3)),
                TriggerPair::new(e(2), e(3)),
            ]
        );
        assert_eq!(TriggerPair::new(e(3), e(1)).first, e(1));
    }

    #[test]
    fn boxes_without_body_are_ignored() {
        let mut physics = PhysicsManager::new();
        boxed(&mut physics, e(0), Vec2::ZERO, Vec2::ZERO);
        physics.set_box(
            e(1),
            BoxCollider {
                extends: Vec2::ONE,
            },
        );
        assert!(physics.fixed_update(0.02).is_empty());
    }

    #[test]
    fn copy_from_includes_contacts() {
        let mut source = PhysicsManager::new();
        boxed(&mut source, e(0), Vec2::ZERO, Vec2::ZERO);
        boxed(&mut source, e(1), Vec2::ZERO, Vec2::ZERO);
        source.fixed_update(0.02);

        let mut target = PhysicsManager::new();
        boxed(&mut target, e(5), Vec2::ZERO, Vec2::ONE);
        target.copy_from(&source);
        assert_eq!(target, source);
        assert!(target.fixed_update(0.02).is_empty());
    }

    #[test]
    fn remove_entity_drops_contacts() {
        let mut physics = PhysicsManager::new();
        boxed(&mut physics, e(0), Vec2::ZERO, Vec2::ZERO);
        boxed(&mut physics, e(1), Vec2::ZERO, Vec2::ZERO);
        physics.fixed_update(0.02);
        physics.remove_entity(e(1));
        assert!(physics.contacts().is_empty());
        assert!(physics.body(e(1)).is_none());
        assert!(physics.collider(e(1)).is_none());
    }
}
