//! Toroidal Geometry
//!
//! Position wrapping and shortest wrapped displacement for a world whose
//! edges join up. Used by movement integration, projectile physics, aiming,
//! and by renderers that point at off-screen players.

use super::vec2::Vec2;

/// Wrap a single coordinate into `[0, dimension)`.
///
/// Negative inputs wrap to the positive range (Euclidean remainder), so
/// `wrap_axis(-50.0, 3000.0) == 2950.0`.
#[inline]
pub fn wrap_axis(value: f64, dimension: f64) -> f64 {
    let wrapped = value.rem_euclid(dimension);
    // rem_euclid keeps -0.0 and can round tiny negatives up to `dimension`
    if wrapped >= dimension || wrapped == 0.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap a position into the `width x height` torus.
#[inline]
pub fn wrap(x: f64, y: f64, width: f64, height: f64) -> (f64, f64) {
    (wrap_axis(x, width), wrap_axis(y, height))
}

/// Wrap a vector position into the `width x height` torus.
#[inline]
pub fn wrap_vec(position: Vec2, width: f64, height: f64) -> Vec2 {
    let (x, y) = wrap(position.x, position.y, width, height);
    Vec2::new(x, y)
}

/// Shortest signed displacement from `a` to `b` along one axis.
///
/// Picks whichever of `b - a`, `(b + dimension) - a` and `(b - dimension) - a`
/// has the smallest magnitude. Ties keep the earlier candidate, so the
/// direct vector wins over its images. The image of `b` is formed before
/// subtracting, which fixes the rounding of every candidate.
#[inline]
pub fn shortest_delta(a: f64, b: f64, dimension: f64) -> f64 {
    let candidates = [b - a, (b + dimension) - a, (b - dimension) - a];

    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.abs() < best.abs() {
            best = *candidate;
        }
    }
    best
}

/// Shortest wrapped displacement vector from `from` to `to`.
#[inline]
pub fn shortest_displacement(from: Vec2, to: Vec2, width: f64, height: f64) -> Vec2 {
    Vec2::new(
        shortest_delta(from.x, to.x, width),
        shortest_delta(from.y, to.y, height),
    )
}

// =============================================================================
// TESTS
// =============================================================================
