//! World Configuration
//!
//! Two playable variants share one simulation core:
//!
//! | | bounded | toroidal |
//! |---|---|---|
//! | field | 800 x 600 | 3000 x 3000 |
//! | edges | clamp players, drop projectiles | wrap everything |
//! | player speed | 1500 u/s | 4500 u/s |
//! | projectile speed | 800 u/s | 1000 u/s |
//! | shoot cooldown | 0.25 s | 0.20 s |
//! | projectile lifetime | none | 1.0 s |
//!
//! Every replica must run with the same configuration; nothing in a frame
//! report carries it.

use serde::{Serialize, Deserialize};

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// How the field treats its edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Fixed screen: players clamp, projectiles leaving the field vanish
    Bounded,
    /// Edges join up: positions wrap, aim uses the nearest image
    Toroidal,
}

impl Topology {
    /// Parse a topology name (`bounded` / `toroidal`, case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bounded" | "arena" => Some(Topology::Bounded),
            "toroidal" | "torus" | "wrap" => Some(Topology::Toroidal),
            _ => None,
        }
    }
}

/// Simulation constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Edge behaviour
    pub topology: Topology,
    /// Field width in world units
    pub width: f64,
    /// Field height in world units
    pub height: f64,
    /// Side length of the square player hitbox
    pub player_size: f64,
    /// Player movement speed (units/second)
    pub player_speed: f64,
    /// Projectile speed (units/second)
    pub projectile_speed: f64,
    /// Minimum simulation time between two shots, exclusive
    pub shoot_cooldown_ns: u64,
    /// Projectile lifetime; `None` means projectiles live until they leave or hit
    pub projectile_lifetime_ns: Option<u64>,
    /// Starting (and maximum) health
    pub max_health: u32,
    /// Lowest value of each spawn color channel
    pub color_min: u8,
    /// Highest value of each spawn color channel
    pub color_max: u8,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::toroidal()
    }
}

impl WorldConfig {
    /// The 800x600 arena with clamped movement.
    pub fn bounded() -> Self {
        Self {
            topology: Topology::Bounded,
            width: 800.0,
            height: 600.0,
            player_size: 40.0,
            player_speed: 1500.0,
            projectile_speed: 800.0,
            shoot_cooldown_ns: 250_000_000,
            projectile_lifetime_ns: None,
            max_health: 10,
            color_min: 50,
            color_max: 255,
        }
    }

    /// The 3000x3000 wraparound world.
    pub fn toroidal() -> Self {
        Self {
            topology: Topology::Toroidal,
            width: 3000.0,
            height: 3000.0,
            player_size: 40.0,
            player_speed: 4500.0,
            projectile_speed: 1000.0,
            shoot_cooldown_ns: 200_000_000,
            projectile_lifetime_ns: Some(NANOS_PER_SECOND),
            max_health: 10,
            color_min: 50,
            color_max: 255,
        }
    }

    /// Preset for a topology.
    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::Bounded => Self::bounded(),
            Topology::Toroidal => Self::toroidal(),
        }
    }

    /// Load from environment variables.
    ///
    /// `ARENA_WORLD` selects the preset (`bounded` or `toroidal`, default
    /// toroidal). Unknown names fall back to the default.
    pub fn from_env() -> Self {
        std::env::var("ARENA_WORLD")
            .ok()
            .and_then(|name| Topology::from_name(&name))
            .map(Self::for_topology)
            .unwrap_or_default()
    }

    /// Whether positions wrap around the edges.
    #[inline]
    pub fn wraps(&self) -> bool {
        self.topology == Topology::Toroidal
    }

    /// Inclusive upper bound of spawn coordinates `(x, y)`.
    ///
    /// Bounded spawns keep the whole hitbox on screen; toroidal spawns may
    /// land exactly on the far edge.
    pub fn spawn_max(&self) -> (f64, f64) {
        match self.topology {
            Topology::Bounded => (self.width - self.player_size, self.height - self.player_size),
            Topology::Toroidal => (self.width, self.height),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let bounded = WorldConfig::bounded();
        assert_eq!(bounded.topology, Topology::Bounded);
        assert_eq!(bounded.projectile_lifetime_ns, None);
        assert_eq!(bounded.spawn_max(), (760.0, 560.0));

        let torus = WorldConfig::toroidal();
        assert!(torus.wraps());
        assert_eq!(torus.projectile_lifetime_ns, Some(1_000_000_000));
        assert_eq!(torus.spawn_max(), (3000.0, 3000.0));
    }

    #[test]
    fn test_topology_names() {
        assert_eq!(Topology::from_name("Bounded"), Some(Topology::Bounded));
        assert_eq!(Topology::from_name(" toroidal "), Some(Topology::Toroidal));
        assert_eq!(Topology::from_name("hex"), None);
    }

    #[test]
    fn test_default_is_toroidal() {
        assert_eq!(WorldConfig::default(), WorldConfig::toroidal());
    }
}
