//! Presentation cache.
//!
//! The renderer reads entity placement from a [`TransformManager`]. The rollback manager is
//! its only writer: rotation and scale once at spawn, positions after every resimulation pass.
//! Soft-deleted entities keep their transform but are hidden until the delete is undone or
//! validated.

use std::collections::BTreeSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ecs::{Component, ComponentTable, Entity, EntityMask};

/// Where and how to draw an entity.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in arena units.
    pub position: Vec2,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Scale factor per axis.
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }
}

impl Component for Transform {
    const MASK: EntityMask = EntityMask::TRANSFORM;
}

/// Per-entity [`Transform`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformManager {
    transforms: ComponentTable<Transform>,
    hidden: BTreeSet<Entity>,
}

impl TransformManager {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity's transform.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&Transform> {
        self.transforms.get(entity)
    }

    /// Returns the entity's position.
    #[must_use]
    pub fn position(&self, entity: Entity) -> Option<Vec2> {
        self.get(entity).map(|t| t.position)
    }

    /// Returns the entity's rotation in degrees.
    #[must_use]
    pub fn rotation(&self, entity: Entity) -> Option<f32> {
        self.get(entity).map(|t| t.rotation)
    }

    /// Returns the entity's scale.
    #[must_use]
    pub fn scale(&self, entity: Entity) -> Option<Vec2> {
        self.get(entity).map(|t| t.scale)
    }

    /// `(entity, transform)` pairs in ascending id order, hidden entities included.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Transform)> + '_ {
        self.transforms.iter()
    }

    /// The pairs of [`iter`](Self::iter) that should be drawn.
    pub fn visible(&self) -> impl Iterator<Item = (Entity, &Transform)> + '_ {
        self.iter()
            .filter(|(entity, _)| !self.hidden.contains(entity))
    }

    /// Returns `true` while the entity is soft-deleted.
    #[must_use]
    pub fn is_hidden(&self, entity: Entity) -> bool {
        self.hidden.contains(&entity)
    }

    /// Number of cached transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub(crate) fn set(&mut self, entity: Entity, transform: Transform) {
        self.transforms.set(entity, transform);
    }

    /// Updates the position of an existing transform. Entities without one are skipped.
    pub(crate) fn set_position(&mut self, entity: Entity, position: Vec2) {
        if let Some(transform) = self.transforms.get_mut(entity) {
            transform.position = position;
        }
    }

    pub(crate) fn set_hidden(&mut self, entity: Entity, hidden: bool) {
        if hidden {
            self.hidden.insert(entity);
        } else {
            self.hidden.remove(&entity);
        }
    }

    pub(crate) fn remove(&mut self, entity: Entity) {
        self.transforms.remove(entity);
        self.hidden.remove(&entity);
    }
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

    #[test]
    fn default_transform_has_unit_scale() {
        let transform = Transform::default();
        assert_eq!(transform.scale, Vec2::ONE);
        assert_eq!(transform.rotation, 0.0);
    }

    #[test]
    fn set_position_keeps_rotation_and_scale() {
        let mut transforms = TransformManager::new();
        let entity = Entity::new(0);
        transforms.set(
            entity,
            Transform {
                position: Vec2::ZERO,
                rotation: 180.0,
                scale: Vec2::splat(5.0),
            },
        );
        transforms.set_position(entity, Vec2::new(1.0, 2.0));
        assert_eq!(transforms.position(entity), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(transforms.rotation(entity), Some(180.0));
        assert_eq!(transforms.scale(entity), Some(Vec2::splat(5.0)));
    }

    #[test]
    fn set_position_ignores_unknown_entities() {
        let mut transforms = TransformManager::new();
        transforms.set_position(Entity::new(3), Vec2::ONE);
        assert!(transforms.is_empty());
    }

    #[test]
    fn hidden_entities_are_not_visible() {
        let mut transforms = TransformManager::new();
        transforms.set(Entity::new(0), Transform::default());
        transforms.set(Entity::new(1), Transform::default());
        transforms.set_hidden(Entity::new(1), true);
        assert!(transforms.is_hidden(Entity::new(1)));
        assert_eq!(transforms.iter().count(), 2);
        let visible: Vec<Entity> = transforms.visible().map(|(entity, _)| entity).collect();
        assert_eq!(visible, vec![Entity::new(0)]);

        transforms.set_hidden(Entity::new(1), false);
        assert_eq!(transforms.visible().count(), 2);
        transforms.set_hidden(Entity::new(0), true);
        transforms.remove(Entity::new(0));
        assert!(!transforms.is_hidden(Entity::new(0)));
    }

    #[test]
    fn remove_drops_transform() {
        let mut transforms = TransformManager::new();
        transforms.set(Entity::new(1), Transform::default());
        assert_eq!(transforms.len(), 1);
        transforms.remove(Entity::new(1));
        assert!(transforms.get(Entity::new(1)).is_none());
    }
}
