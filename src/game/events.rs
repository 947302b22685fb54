//! Game Events
//!
//! Events generated while applying a frame, for logging, UIs and replay
//! comparison. They describe what happened; they never feed back into the
//! simulation.

use serde::{Serialize, Deserialize};
use crate::core::vec2::Vec2;
use crate::game::state::{PlayerId, MatchPhase};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// First sight of an identity
    PlayerSpawned {
        /// Identity that joined
        player_id: PlayerId,
        /// Spawn position
        position: Vec2,
        /// RGB color
        color: [u8; 3],
    },

    /// Match phase changed
    PhaseChanged {
        /// Phase before the change
        old_phase: MatchPhase,
        /// Phase after the change
        new_phase: MatchPhase,
    },

    /// A shot was accepted and a projectile created
    ProjectileFired {
        /// New projectile
        projectile_id: u64,
        /// Shooter
        owner: PlayerId,
        /// Starting position (the shooter's center)
        position: Vec2,
        /// Velocity in units per second
        velocity: Vec2,
    },

    /// A projectile struck a player (damage lands after the collision pass)
    PlayerHit {
        /// Player struck
        player_id: PlayerId,
        /// Projectile that struck
        projectile_id: u64,
        /// Shooter
        owner: PlayerId,
    },

    /// A player's health reached zero
    PlayerEliminated {
        /// Player eliminated
        player_id: PlayerId,
    },

    /// Match ended
    MatchFinished {
        /// Sole survivor, or `None` when nobody survived
        winner_id: Option<PlayerId>,
    },
}

/// A game event stamped with the frame that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Frame number
    pub frame: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(frame: u64, data: GameEventData) -> Self {
        Self { frame, data }
    }

    /// Create player spawned event.
    pub fn player_spawned(frame: u64, player_id: PlayerId, position: Vec2, color: [u8; 3]) -> Self {
        Self::new(frame, GameEventData::PlayerSpawned { player_id, position, color })
    }

    /// Create phase changed event.
    pub fn phase_changed(frame: u64, old_phase: MatchPhase, new_phase: MatchPhase) -> Self {
        Self::new(frame, GameEventData::PhaseChanged { old_phase, new_phase })
    }

    /// Create projectile fired event.
    pub fn projectile_fired(
        frame: u64,
        projectile_id: u64,
        owner: PlayerId,
        position: Vec2,
        velocity: Vec2,
    ) -> Self {
        Self::new(
            frame,
            GameEventData::ProjectileFired {
                projectile_id,
                owner,
                position,
                velocity,
            },
        )
    }

    /// Create player hit event.
    pub fn player_hit(frame: u64, player_id: PlayerId, projectile_id: u64, owner: PlayerId) -> Self {
        Self::new(frame, GameEventData::PlayerHit { player_id, projectile_id, owner })
    }

    /// Create player eliminated event.
    pub fn player_eliminated(frame: u64, player_id: PlayerId) -> Self {
        Self::new(frame, GameEventData::PlayerEliminated { player_id })
    }

    /// Create match finished event.
    pub fn match_finished(frame: u64, winner_id: Option<PlayerId>) -> Self {
        Self::new(frame, GameEventData::MatchFinished { winner_id })
    }
}
