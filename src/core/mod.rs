//! Core deterministic primitives.
//!
//! Everything the world is built from. No floats, no hash-ordered
//! collections, no clocks: two peers given the same inputs must end up with
//! the same bits.

pub mod fixed;
pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher};
