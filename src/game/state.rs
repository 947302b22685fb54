//! World State Definitions
//!
//! All state owned by one replica of the simulation.
//! Uses BTreeMap for deterministic lookup and keeps join order separately,
//! since collision and win checks walk players in the order they appeared.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::crypto::keys::short_identity;
use crate::game::config::WorldConfig;
use crate::game::events::GameEvent;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Player identifier: the canonical PEM text of the player's public key.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap an identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The full identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs.
    pub fn short(&self) -> String {
        short_identity(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&PlayerId> for PlayerId {
    fn from(id: &PlayerId) -> Self {
        id.clone()
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.short())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Identity
    pub id: PlayerId,

    /// Top-left corner of the square hitbox
    pub position: Vec2,

    /// Display color (RGB), fixed at spawn
    pub color: [u8; 3],

    /// Remaining health; never increases
    pub health: u32,

    /// Simulation time of the last accepted shot (`None` = never fired)
    pub last_shot_ns: Option<u64>,
}

impl PlayerState {
    /// Create a player at full health.
    pub fn new(id: PlayerId, position: Vec2, color: [u8; 3], health: u32) -> Self {
        Self {
            id,
            position,
            color,
            health,
            last_shot_ns: None,
        }
    }

    /// Is the player still in the match?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Centre of the hitbox, where shots originate.
    #[inline]
    pub fn centre(&self, size: f64) -> Vec2 {
        Vec2::new(self.position.x + size / 2.0, self.position.y + size / 2.0)
    }

    /// Whether the shoot cooldown has elapsed at simulation time `now_ns`.
    ///
    /// The cooldown is exclusive: a shot exactly `cooldown_ns` after the
    /// previous one is still refused.
    #[inline]
    pub fn can_shoot(&self, now_ns: u64, cooldown_ns: u64) -> bool {
        match self.last_shot_ns {
            None => true,
            Some(last) => now_ns.saturating_sub(last) > cooldown_ns,
        }
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_str(self.id.as_str());
        hasher.update_vec2(self.position);
        hasher.update_bytes(&self.color);
        hasher.update_u32(self.health);
        match self.last_shot_ns {
            Some(ns) => {
                hasher.update_bool(true);
                hasher.update_u64(ns);
            }
            None => hasher.update_bool(false),
        }
    }
}

// =============================================================================
// PROJECTILE
// =============================================================================

/// A projectile in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Unique id (monotonic counter per world)
    pub id: u64,

    /// Current position
    pub position: Vec2,

    /// Velocity in units/second
    pub velocity: Vec2,

    /// Shooter; a projectile never hits its owner
    pub owner: PlayerId,

    /// Simulation time at which it was fired
    pub created_ns: u64,
}

impl Projectile {
    /// Whether the projectile has outlived `lifetime_ns` at `now_ns`.
    #[inline]
    pub fn is_expired(&self, now_ns: u64, lifetime_ns: Option<u64>) -> bool {
        match lifetime_ns {
            Some(lifetime) => now_ns.saturating_sub(self.created_ns) > lifetime,
            None => false,
        }
    }

    /// Hash this projectile for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.id);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_str(self.owner.as_str());
        hasher.update_u64(self.created_ns);
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Current phase of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum MatchPhase {
    /// Lobby: players may join, nothing moves
    #[default]
    Waiting,
    /// Gameplay
    Active,
    /// One or zero players left; terminal
    Finished,
}

impl MatchPhase {
    fn as_u8(self) -> u8 {
        match self {
            MatchPhase::Waiting => 0,
            MatchPhase::Active => 1,
            MatchPhase::Finished => 2,
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPhase::Waiting => "waiting",
            MatchPhase::Active => "active",
            MatchPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Complete state of one replica.
///
/// Uses BTreeMap for deterministic iteration order; `join_order` records
/// first sight of every identity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorldState {
    /// Current match phase
    pub phase: MatchPhase,

    /// Simulation clock: sum of elapsed time over applied frames (ns)
    pub clock_ns: u64,

    /// Number of frames applied so far
    pub frames_applied: u64,

    /// All players keyed by identity
    pub players: BTreeMap<PlayerId, PlayerState>,

    /// Identities in the order they were first seen
    pub join_order: Vec<PlayerId>,

    /// Projectiles in creation order
    pub projectiles: Vec<Projectile>,

    /// Next projectile id (monotonic counter)
    pub next_projectile_id: u64,

    /// Sole survivor once Finished (`None` if nobody survived)
    pub winner: Option<PlayerId>,

    /// Events generated during the current frame
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

impl WorldState {
    /// Create an empty world in the Waiting phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a player seeded from their identity.
    ///
    /// Position and color come from a generator built from the identity and
    /// discarded afterwards, so every replica agrees without coordination.
    /// Returns `false` (and changes nothing) if the identity already exists.
    pub fn spawn_player(&mut self, id: &PlayerId, config: &WorldConfig) -> bool {
        if self.players.contains_key(id) {
            return false;
        }
        let player = spawn_state(id, config);
        self.players.insert(id.clone(), player);
        self.join_order.push(id.clone());
        true
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    /// Players in join order.
    pub fn players_in_join_order(&self) -> impl Iterator<Item = &PlayerState> {
        self.join_order.iter().filter_map(|id| self.players.get(id))
    }

    /// Living players in join order.
    pub fn alive_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players_in_join_order().filter(|p| p.is_alive())
    }

    /// Number of living players.
    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    /// Add a projectile and return its id.
    pub fn spawn_projectile(&mut self, owner: PlayerId, position: Vec2, velocity: Vec2) -> u64 {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles.push(Projectile {
            id,
            position,
            velocity,
            owner,
            created_ns: self.clock_ns,
        });
        id
    }

    /// Compute hash of current state for verification.
    ///
    /// Floats enter by bit pattern, players in join order.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.frames_applied, self.clock_ns, |hasher| {
            hasher.update_u8(self.phase.as_u8());

            hasher.update_u64(self.join_order.len() as u64);
            for player in self.players_in_join_order() {
                player.hash_into(hasher);
            }

            hasher.update_u64(self.projectiles.len() as u64);
            for projectile in &self.projectiles {
                projectile.hash_into(hasher);
            }

            hasher.update_u64(self.next_projectile_id);
            match &self.winner {
                Some(id) => {
                    hasher.update_bool(true);
                    hasher.update_str(id.as_str());
                }
                None => hasher.update_bool(false),
            }
        })
    }

    /// Byte-exact snapshot for comparing replicas.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

/// Initial state of a player, derived only from identity and config.
pub fn spawn_state(id: &PlayerId, config: &WorldConfig) -> PlayerState {
    let mut rng = DeterministicRng::from_identity(id.as_str());
    let (max_x, max_y) = config.spawn_max();

    let x = rng.next_int_range(0, max_x as i32);
    let y = rng.next_int_range(0, max_y as i32);
    let color = [
        rng.next_u8_range(config.color_min, config.color_max),
        rng.next_u8_range(config.color_min, config.color_max),
        rng.next_u8_range(config.color_min, config.color_max),
    ];

    PlayerState::new(
        id.clone(),
        Vec2::new(x as f64, y as f64),
        color,
        config.max_health,
    )
}

// =============================================================================
// TESTS
// =============================================================================
