//! Game Model
//!
//! The shared world and everything allowed to change it. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `world`: Bodies, economies, projectiles, world hash
//! - `instruction`: Generation instructions (world construction steps)
//! - `builder`: World Builder, applies instructions during the handshake
//! - `command`: Synced commands, validated and applied while running
//! - `generator`: Seeded instruction list for the generation author

pub mod world;
pub mod instruction;
pub mod builder;
pub mod command;
pub mod generator;

// Re-export key types
pub use world::{World, Body, BodyId, Economy, EcoStats, EcoValue, ParticipantId, Projectile, ProjectileId};
pub use instruction::{GenerationInstruction, PlaceBody, AssignEconomy};
pub use builder::{WorldBuilder, BuildError, apply_instruction};
pub use command::{CommandRequest, CommandAction, CommandEffect, CommandRejection, FireProjectile};
pub use generator::{GenerationConfig, generate_instructions};
