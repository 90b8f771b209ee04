//! # Entity/Component Store
//!
//! Entities are plain ids. What an entity *is* is recorded twice:
//!
//! - in the [`EntityManager`], a single registry shared by both simulation tracks, as a
//!   presence bitmask ([`EntityMask`]) per entity, and
//! - in [`ComponentTable`]s, sparse per-kind tables holding the component values. Every
//!   simulation track owns its own tables so the current and the last-validated state can
//!   diverge while speculating.
//!
//! Nothing here knows about balls or paddles. The [`Component`] trait binds a value type to
//! its mask bit so generic code can keep registry and tables in step.

mod component;
mod entity;

pub use component::{Component, ComponentTable};
pub use entity::{Entity, EntityManager, EntityMask};
