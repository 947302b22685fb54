//! Collision Detection
//!
//! Projectiles are points, players are axis-aligned squares anchored at their
//! top-left corner. No continuous sweep: a projectile that jumps over a
//! hitbox within one frame misses.

use crate::core::vec2::Vec2;
use crate::game::state::{PlayerId, WorldState};

/// Check if a point lies inside a square hitbox.
///
/// Half-open on both axes: `corner.x <= p.x < corner.x + size`.
#[inline]
pub fn point_in_square(point: Vec2, corner: Vec2, size: f64) -> bool {
    point.x >= corner.x
        && point.x < corner.x + size
        && point.y >= corner.y
        && point.y < corner.y + size
}

/// Check if a point is strictly inside the `width x height` field.
///
/// Points on the boundary count as outside.
#[inline]
pub fn inside_open_field(point: Vec2, width: f64, height: f64) -> bool {
    0.0 < point.x && point.x < width && 0.0 < point.y && point.y < height
}

/// Find the player a projectile at `point` strikes.
///
/// Walks living players in join order, skipping the owner; the first
/// hitbox containing the point wins.
pub fn find_projectile_target(
    state: &WorldState,
    point: Vec2,
    owner: &PlayerId,
    player_size: f64,
) -> Option<PlayerId> {
    state
        .alive_players()
        .filter(|player| &player.id != owner)
        .find(|player| point_in_square(point, player.position, player_size))
        .map(|player| player.id.clone())
}

/// A projectile striking a player.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectileHit {
    /// Projectile that struck
    pub projectile_id: u64,
    /// Player struck
    pub victim: PlayerId,
    /// Shooter
    pub owner: PlayerId,
}

/// Damage accumulated over one collision pass.
///
/// Keeps victims in first-hit order so derived events are stable.
#[derive(Debug, Default)]
pub struct DamageMap {
    entries: Vec<(PlayerId, u32)>,
}

impl DamageMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one point of damage to `victim`.
    pub fn add(&mut self, victim: &PlayerId) {
        match self.entries.iter_mut().find(|(id, _)| id == victim) {
            Some((_, damage)) => *damage += 1,
            None => self.entries.push((victim.clone(), 1)),
        }
    }

    /// Total damage for `victim` this pass.
    pub fn get(&self, victim: &PlayerId) -> u32 {
        self.entries
            .iter()
            .find(|(id, _)| id == victim)
            .map(|(_, damage)| *damage)
            .unwrap_or(0)
    }

    /// Whether nobody was hit.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate victims in first-hit order.
    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, u32)> {
        self.entries.iter().map(|(id, damage)| (id, *damage))
    }
}
