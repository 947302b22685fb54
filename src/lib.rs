//! # Arena Replica
//!
//! Peer-replicated arena engine. Every participant rebuilds the same world
//! by applying the same relay-ordered stream of signed actions; nobody
//! trusts anybody else's simulation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ARENA REPLICA                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── vec2.rs      - f64 2D vector                            │
//! │  ├── torus.rs     - Wraparound and shortest wrapped delta    │
//! │  ├── rng.rs       - Identity-seeded Xorshift128+             │
//! │  └── hash.rs      - State hashing for replica comparison     │
//! │                                                              │
//! │  crypto/          - Signature codec                          │
//! │  ├── canonical.rs - Sorted-key JSON encoding                 │
//! │  ├── keys.rs      - RSA key pairs and PEM identities         │
//! │  └── signer.rs    - PKCS#1 v1.5 / SHA-256 sign and verify    │
//! │                                                              │
//! │  game/            - Simulation (deterministic)               │
//! │  ├── config.rs    - Bounded and toroidal world constants     │
//! │  ├── action.rs    - Player actions                           │
//! │  ├── state.rs     - World, player and projectile state       │
//! │  ├── tick.rs      - Per-frame application                    │
//! │  ├── collision.rs - Hit tests and damage                     │
//! │  └── events.rs    - Game events                              │
//! │                                                              │
//! │  network/         - Networking (non-deterministic)           │
//! │  ├── protocol.rs  - JSON-RPC payloads                        │
//! │  ├── auth.rs      - Signed envelopes and report validation   │
//! │  ├── batcher.rs   - Relay frame batching                     │
//! │  ├── session.rs   - Peer replica and frame sequencing        │
//! │  ├── server.rs    - WebSocket relay                          │
//! │  └── client.rs    - WebSocket peer                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - Only IEEE-754 basic operations and `sqrt` on `f64`
//! - No HashMap (BTreeMap plus an explicit join order)
//! - No wall clock; time is the sum of reported frame durations
//! - Spawn randomness seeded from the player identity alone
//!
//! Given the same frames, any two replicas end in **bit-identical** worlds.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod crypto;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::rng::DeterministicRng;
pub use game::config::{Topology, WorldConfig};
pub use game::state::{PlayerId, WorldState, MatchPhase};
pub use game::tick::{apply_frame, replay_frames, Frame, FrameResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Relay report rate (Hz)
pub const TICK_RATE: u32 = 60;
