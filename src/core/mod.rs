//! Core deterministic primitives.
//!
//! Small building blocks shared by the simulation: canvas-space vectors,
//! a seeded PRNG and state hashing for replay checks.

pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, StateHash};
