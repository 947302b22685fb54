//! Core deterministic primitives.
//!
//! Everything here is pure and platform-independent. These are the building
//! blocks every replica must evaluate identically.

pub mod vec2;
pub mod torus;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use torus::{wrap, wrap_vec, shortest_delta, shortest_displacement};
pub use rng::DeterministicRng;
pub use hash::{StateHash, compute_state_hash};
