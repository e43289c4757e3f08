//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-platform determinism.
//! They are the foundation the simulation and replay verification build on.

pub mod fixed;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, StateHash};
