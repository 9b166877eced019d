//! World State Definitions
//!
//! The aggregate every peer builds during the handshake and then mutates
//! only through synced commands. BTreeMap everywhere for deterministic
//! iteration, fixed-point everywhere for deterministic arithmetic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_clamp, fixed_div};
use crate::core::vec2::FixedVec2;
use crate::core::hash::{StateHash, StateHasher};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Session-scoped participant identifier.
///
/// Assigned once before the handshake and stable for the whole session.
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ParticipantId(pub u8);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Identifier of a celestial body, chosen by the generation author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Identifier of a projectile.
///
/// Keyed by owner and the owner's shot counter rather than a global counter,
/// so shots from different participants get the same ids on every peer no
/// matter how their commands interleave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectileId {
    /// Participant whose economy fired it
    pub owner: ParticipantId,
    /// Owner's shot number, starting at 0
    pub seq: u32,
}

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shot#{}.{}", self.owner.0, self.seq)
    }
}

// =============================================================================
// BODIES
// =============================================================================

/// A planet or star.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Body identifier
    pub id: BodyId,
    /// Center position
    pub position: FixedVec2,
    /// Velocity at placement
    pub velocity: FixedVec2,
    /// Radius (> 0)
    pub radius: Fixed,
    /// Mass (> 0)
    pub mass: Fixed,
    /// Current health
    pub health: Fixed,
    /// Maximum health (> 0)
    pub max_health: Fixed,
}

impl Body {
    /// Is the body still intact?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Health as a fraction of max health, FIXED_ONE = 100%.
    pub fn health_fraction(&self) -> Fixed {
        fixed_clamp(fixed_div(self.health, self.max_health), 0, FIXED_ONE)
    }
}

// =============================================================================
// ECONOMY
// =============================================================================

/// The four tunable economy values a player balances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EcoValue {
    /// Resource income per second
    Income = 0,
    /// Projectile stock
    Projectiles = 1,
    /// Shots per second
    FireRate = 2,
    /// Damage reduction investment
    Defenses = 3,
}

/// Values of one economy, all fixed-point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcoStats {
    /// Resource income per second
    pub income: Fixed,
    /// Projectile stock; one shot costs `PROJECTILE_COST`
    pub projectiles: Fixed,
    /// Shots per second
    pub fire_rate: Fixed,
    /// Damage reduction investment
    pub defenses: Fixed,
}

impl EcoStats {
    /// Read one value.
    pub fn get(&self, value: EcoValue) -> Fixed {
        match value {
            EcoValue::Income => self.income,
            EcoValue::Projectiles => self.projectiles,
            EcoValue::FireRate => self.fire_rate,
            EcoValue::Defenses => self.defenses,
        }
    }
}

/// A player's economy, anchored to the body it lives on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economy {
    /// Owning participant
    pub player: ParticipantId,
    /// Home body
    pub body: BodyId,
    /// Current values
    pub stats: EcoStats,
    /// Shots fired so far (next projectile's `seq`)
    pub shots_fired: u32,
}

// =============================================================================
// PROJECTILES
// =============================================================================

/// A projectile in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Projectile identifier
    pub id: ProjectileId,
    /// Launch position
    pub position: FixedVec2,
    /// Launch velocity
    pub velocity: FixedVec2,
    /// Logical time the firing command was submitted
    pub fired_at: u32,
}

/// A cosmetic particle shot, only present in debug builds of the protocol.
#[cfg(feature = "debug-commands")]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugParticle {
    /// Who fired it
    pub owner: ParticipantId,
    /// Launch position
    pub position: FixedVec2,
    /// Launch velocity
    pub velocity: FixedVec2,
}

// =============================================================================
// WORLD
// =============================================================================

/// The shared simulation world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    /// Closed roster agreed before the handshake
    pub participants: BTreeSet<ParticipantId>,
    /// All bodies by id
    pub bodies: BTreeMap<BodyId, Body>,
    /// One economy per participant (once assigned)
    pub economies: BTreeMap<ParticipantId, Economy>,
    /// Projectiles in flight
    pub projectiles: BTreeMap<ProjectileId, Projectile>,
    /// Debug particle shots, per owner in that owner's command order
    #[cfg(feature = "debug-commands")]
    pub debug_particles: BTreeMap<ParticipantId, Vec<DebugParticle>>,
}

impl World {
    /// Create an empty world for a fixed roster.
    pub fn new(participants: BTreeSet<ParticipantId>) -> Self {
        Self {
            participants,
            bodies: BTreeMap::new(),
            economies: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            #[cfg(feature = "debug-commands")]
            debug_particles: BTreeMap::new(),
        }
    }

    /// Is this participant part of the session roster?
    pub fn is_participant(&self, id: ParticipantId) -> bool {
        self.participants.contains(&id)
    }

    /// Look up a body.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// Look up a participant's economy.
    pub fn economy(&self, player: ParticipantId) -> Option<&Economy> {
        self.economies.get(&player)
    }

    /// Find the economy living on a body, if any.
    pub fn economy_on(&self, body: BodyId) -> Option<&Economy> {
        self.economies.values().find(|e| e.body == body)
    }

    /// Deterministic digest of the entire world.
    ///
    /// Two peers with equal worlds have equal hashes; comparing hashes is how
    /// operators and tests spot a desync without shipping the world around.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_world();

        hasher.update_u32(self.participants.len() as u32);
        for id in &self.participants {
            hasher.update_u8(id.0);
        }

        hasher.update_u32(self.bodies.len() as u32);
        for body in self.bodies.values() {
            hasher.update_u32(body.id.0);
            hasher.update_vec2(body.position);
            hasher.update_vec2(body.velocity);
            hasher.update_fixed(body.radius);
            hasher.update_fixed(body.mass);
            hasher.update_fixed(body.health);
            hasher.update_fixed(body.max_health);
        }

        hasher.update_u32(self.economies.len() as u32);
        for eco in self.economies.values() {
            hasher.update_u8(eco.player.0);
            hasher.update_u32(eco.body.0);
            hasher.update_fixed(eco.stats.income);
            hasher.update_fixed(eco.stats.projectiles);
            hasher.update_fixed(eco.stats.fire_rate);
            hasher.update_fixed(eco.stats.defenses);
            hasher.update_u32(eco.shots_fired);
        }

        hasher.update_u32(self.projectiles.len() as u32);
        for projectile in self.projectiles.values() {
            hasher.update_u8(projectile.id.owner.0);
            hasher.update_u32(projectile.id.seq);
            hasher.update_vec2(projectile.position);
            hasher.update_vec2(projectile.velocity);
            hasher.update_u32(projectile.fired_at);
        }

        #[cfg(feature = "debug-commands")]
        {
            for (owner, particles) in &self.debug_particles {
                hasher.update_u8(owner.0);
                hasher.update_u32(particles.len() as u32);
                for particle in particles {
                    hasher.update_vec2(particle.position);
                    hasher.update_vec2(particle.velocity);
                }
            }
        }

        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================
