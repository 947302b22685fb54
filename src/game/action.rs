//! Player Actions
//!
//! The closed set of things a participant can ask the world to do. Wire
//! decoding happens once at the envelope boundary; the simulation core only
//! ever sees [`AuthoredAction`]s.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;

/// Movement direction, keyed like the keyboard layout it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `w`: negative y
    #[serde(rename = "w")]
    Up,
    /// `a`: negative x
    #[serde(rename = "a")]
    Left,
    /// `s`: positive y
    #[serde(rename = "s")]
    Down,
    /// `d`: positive x
    #[serde(rename = "d")]
    Right,
}

impl Direction {
    /// Parse a wire key (`w`, `a`, `s`, `d`).
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" => Some(Direction::Up),
            "a" => Some(Direction::Left),
            "s" => Some(Direction::Down),
            "d" => Some(Direction::Right),
            _ => None,
        }
    }

    /// Wire key for this direction.
    pub fn key(self) -> &'static str {
        match self {
            Direction::Up => "w",
            Direction::Left => "a",
            Direction::Down => "s",
            Direction::Right => "d",
        }
    }
}

/// A player action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Announce presence; spawns the author if unseen
    Join,
    /// Move the match from Waiting to Active
    StartMatch,
    /// Step along one axis; also spawns an unseen author
    Move {
        /// Direction of travel
        direction: Direction,
    },
    /// Fire at a world position
    Shoot {
        /// Target x in world units
        target_x: i64,
        /// Target y in world units
        target_y: i64,
    },
}

impl Action {
    /// JSON-RPC method name carrying this action.
    pub fn method(&self) -> &'static str {
        match self {
            Action::Join => "player.join",
            Action::StartMatch => "game.start",
            Action::Move { .. } => "player.move",
            Action::Shoot { .. } => "player.shoot",
        }
    }

    /// Whether this action creates its author on first sight.
    pub fn spawns_author(&self) -> bool {
        matches!(self, Action::Join | Action::Move { .. })
    }

    /// Shorthand for a move action.
    pub fn moving(direction: Direction) -> Self {
        Action::Move { direction }
    }

    /// Shorthand for a shoot action.
    pub fn shoot(target_x: i64, target_y: i64) -> Self {
        Action::Shoot { target_x, target_y }
    }
}

/// JSON-RPC request id: a string or an integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id
    Number(i64),
    /// String id (UUIDv4 for locally produced requests)
    Text(String),
}

impl RequestId {
    /// Fresh random id.
    pub fn new_v4() -> Self {
        RequestId::Text(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

/// An authenticated action: who asked, what, and under which request id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthoredAction {
    /// Signer identity
    pub author: PlayerId,
    /// Request id, kept for logging
    pub request_id: RequestId,
    /// The action itself
    pub action: Action,
}

impl AuthoredAction {
    /// Build an authored action.
    pub fn new(author: impl Into<PlayerId>, request_id: RequestId, action: Action) -> Self {
        Self {
            author: author.into(),
            request_id,
            action,
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
    fn test_direction_keys() {
        for direction in [Direction::Up, Direction::Left, Direction::Down, Direction::Right] {
            assert_eq!(Direction::from_key(direction.key()), Some(direction));
        }
        assert_eq!(Direction::from_key("x"), None);
        assert_eq!(Direction::from_key("W"), None);
    }

    #[test]
    fn test_direction_serde() {
        assert_eq!(serde_json::to_string(&Direction::Right).unwrap(), "\"d\"");
        let parsed: Direction = serde_json::from_str("\"w\"").unwrap();
        assert_eq!(parsed, Direction::Up);
    }

    #[test]
    fn test_spawning_actions() {
        assert!(Action::Join.spawns_author());
        assert!(Action::moving(Direction::Left).spawns_author());
        assert!(!Action::StartMatch.spawns_author());
        assert!(!Action::shoot(1, 2).spawns_author());
    }

    #[test]
    fn test_request_id_untagged() {
        let n: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(n, RequestId::Number(7));
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RequestId::Text("abc".into()));
        assert_eq!(s.to_string(), "abc");
    }
}
