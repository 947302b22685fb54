//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `config`: World constants for the bounded and toroidal variants
//! - `action`: Player actions and their authors
//! - `state`: World, player and projectile state
//! - `tick`: Per-frame application
//! - `collision`: Hit tests and damage accumulation
//! - `events`: Game events for logging and replay comparison

pub mod config;
pub mod action;
pub mod state;
pub mod tick;
pub mod collision;
pub mod events;

// Re-export key types
pub use config::{Topology, WorldConfig};
pub use action::{Action, AuthoredAction, Direction, RequestId};
pub use state::{MatchPhase, PlayerId, PlayerState, Projectile, WorldState};
pub use tick::{apply_frame, replay_frames, Frame, FrameResult};
pub use events::{GameEvent, GameEventData};
