//! # Syzygy Session Core
//!
//! Lockstep session core for Syzygy: peers build one shared world through a
//! generation handshake, then keep it identical by validating and applying
//! the same synced commands in each sender's order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SYZYGY SESSION CORE                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - World hashing for desync checks           │
//! │                                                              │
//! │  game/           - World model (deterministic)               │
//! │  ├── world.rs    - Bodies, economies, projectiles            │
//! │  ├── instruction.rs - Generation instructions                │
//! │  ├── builder.rs  - World Builder                             │
//! │  ├── command.rs  - Synced commands (validate / apply)        │
//! │  └── generator.rs- Seeded instruction list for the author    │
//! │                                                              │
//! │  network/        - Protocols (non-deterministic timing)      │
//! │  ├── transport.rs- Byte links, in-process mesh               │
//! │  ├── protocol.rs - Frame codec                               │
//! │  ├── handshake.rs- Generation handshake state machine        │
//! │  ├── dispatcher.rs- Synced command dispatcher                │
//! │  └── session.rs  - Per-tick session pump                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in world mutation
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Two peers that apply the same instructions in the same order, then the
//! same commands in each sender's order, hold bit-identical worlds.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::DeterministicRng;
pub use game::world::{World, ParticipantId, BodyId};
pub use game::command::{CommandRequest, CommandAction};
pub use network::session::{Session, SessionConfig, SessionEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Game-loop tick rate the session pump is designed around (Hz)
pub const TICK_RATE: u32 = 60;
