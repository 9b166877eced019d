//! Synced Commands
//!
//! In-simulation actions a participant proposes once the world is running.
//! `validate` is the predicate every peer runs against its own copy of the
//! world; `apply` re-checks it and then mutates. Both are pure functions of
//! the world and the request, so peers holding equal worlds agree.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, fixed_mul, PROJECTILE_COST, PROJECTILE_SPAWN_FACTOR, PROJECTILE_SPEED};
use crate::core::vec2::FixedVec2;
use crate::game::world::{BodyId, ParticipantId, Projectile, ProjectileId, World};
#[cfg(feature = "debug-commands")]
use crate::game::world::DebugParticle;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Fire from a body in a direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireProjectile {
    /// Body to fire from (must host the origin's economy)
    pub body: BodyId,
    /// Aim direction; any non-zero length, normalized on apply
    pub aim: FixedVec2,
}

/// What a command does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandAction {
    /// Spend one projectile and launch it
    FireProjectile(FireProjectile),
    /// Launch a cosmetic particle, free of charge
    #[cfg(feature = "debug-commands")]
    DebugFireParticle(FireProjectile),
}

/// A command proposed by one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Participant proposing the command
    pub origin: ParticipantId,
    /// Logical time at submission (game-loop tick of the origin)
    pub submitted_at: u32,
    /// The action
    pub action: CommandAction,
}

impl CommandRequest {
    /// Build a FireProjectile request.
    pub fn fire(origin: ParticipantId, submitted_at: u32, body: BodyId, aim: FixedVec2) -> Self {
        Self {
            origin,
            submitted_at,
            action: CommandAction::FireProjectile(FireProjectile { body, aim }),
        }
    }

    /// Build a DebugFireParticle request.
    #[cfg(feature = "debug-commands")]
    pub fn debug_particle(origin: ParticipantId, submitted_at: u32, body: BodyId, aim: FixedVec2) -> Self {
        Self {
            origin,
            submitted_at,
            action: CommandAction::DebugFireParticle(FireProjectile { body, aim }),
        }
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self.action {
            CommandAction::FireProjectile(_) => "FireProjectile",
            #[cfg(feature = "debug-commands")]
            CommandAction::DebugFireParticle(_) => "DebugFireParticle",
        }
    }

    /// Check the request against `world` without mutating it.
    pub fn validate(&self, world: &World) -> Result<(), CommandRejection> {
        self.launch(world).map(|_| ())
    }

    /// Validate and, if valid, apply to `world`.
    ///
    /// A rejected request leaves `world` untouched.
    pub fn apply(&self, world: &mut World) -> Result<CommandEffect, CommandRejection> {
        let launch = self.launch(world)?;

        match self.action {
            CommandAction::FireProjectile(_) => {
                let economy = world
                    .economies
                    .get_mut(&self.origin)
                    .ok_or(CommandRejection::NoEconomy(self.origin))?;
                economy.stats.projectiles -= PROJECTILE_COST;
                let id = ProjectileId { owner: self.origin, seq: economy.shots_fired };
                economy.shots_fired += 1;

                world.projectiles.insert(id, Projectile {
                    id,
                    position: launch.position,
                    velocity: launch.velocity,
                    fired_at: self.submitted_at,
                });
                Ok(CommandEffect::ProjectileFired(id))
            }
            #[cfg(feature = "debug-commands")]
            CommandAction::DebugFireParticle(_) => {
                world.debug_particles.entry(self.origin).or_default().push(DebugParticle {
                    owner: self.origin,
                    position: launch.position,
                    velocity: launch.velocity,
                });
                Ok(CommandEffect::ParticleFired)
            }
        }
    }

    fn launch(&self, world: &World) -> Result<Launch, CommandRejection> {
        let (fire, cost) = match &self.action {
            CommandAction::FireProjectile(fire) => (fire, PROJECTILE_COST),
            #[cfg(feature = "debug-commands")]
            CommandAction::DebugFireParticle(fire) => (fire, 0),
        };

        let economy = world
            .economy(self.origin)
            .ok_or(CommandRejection::NoEconomy(self.origin))?;
        if economy.body != fire.body {
            return Err(CommandRejection::NotOwnBody { body: fire.body, home: economy.body });
        }
        let body = world.body(fire.body).ok_or(CommandRejection::UnknownBody(fire.body))?;
        if !body.is_alive() {
            return Err(CommandRejection::BodyDestroyed(fire.body));
        }
        if economy.stats.projectiles < cost {
            return Err(CommandRejection::NoProjectiles { available: economy.stats.projectiles });
        }
        if fire.aim.is_zero() {
            return Err(CommandRejection::ZeroAim);
        }

        let dir = fire.aim.normalize();
        let spawn_offset: Fixed = fixed_mul(body.radius, PROJECTILE_SPAWN_FACTOR);
        Ok(Launch {
            position: body.position + dir.scale(spawn_offset),
            velocity: body.velocity + dir.scale(PROJECTILE_SPEED),
        })
    }
}

/// Where and how fast a shot leaves its body.
struct Launch {
    position: FixedVec2,
    velocity: FixedVec2,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// What an applied command changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandEffect {
    /// A projectile was spawned
    ProjectileFired(ProjectileId),
    /// A debug particle was spawned
    #[cfg(feature = "debug-commands")]
    ParticleFired,
}

/// Why a command failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejection {
    /// Origin has no economy.
    #[error("{0} has no economy")]
    NoEconomy(ParticipantId),
    /// Origin tried to fire from a body it does not live on.
    #[error("body {body} is not the origin's home body {home}")]
    NotOwnBody {
        /// Body named in the request
        body: BodyId,
        /// Body the origin's economy lives on
        home: BodyId,
    },
    /// Body does not exist.
    #[error("body {0} does not exist")]
    UnknownBody(BodyId),
    /// Body has no health left.
    #[error("body {0} is destroyed")]
    BodyDestroyed(BodyId),
    /// Stock is below the cost of one shot.
    #[error("not enough projectiles (have {available} raw)")]
    NoProjectiles {
        /// Current stock, raw Q16.16
        available: Fixed,
    },
    /// Aim vector is zero.
    #[error("aim direction is zero")]
    ZeroAim,
}

// =============================================================================
// TESTS
// =============================================================================
