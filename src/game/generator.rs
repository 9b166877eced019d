//! Instruction Generator
//!
//! Produces the author's instruction list from a seed: one star at the
//! origin, one home planet per participant on a seeded ring, then one
//! economy per participant. Same seed and roster, same list.

use std::collections::BTreeSet;

use crate::core::fixed::{Fixed, FIXED_ONE, ARENA_HALF_EXTENT, fixed_clamp, to_fixed};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::instruction::{AssignEconomy, GenerationInstruction, PlaceBody};
use crate::game::world::{BodyId, EcoStats, ParticipantId};

/// The central star always gets this id.
pub const STAR_ID: BodyId = BodyId(0);

/// Arena layout knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Star radius
    pub star_radius: Fixed,
    /// Star mass
    pub star_mass: Fixed,
    /// Star max health
    pub star_health: Fixed,
    /// Planet radius
    pub planet_radius: Fixed,
    /// Planet mass
    pub planet_mass: Fixed,
    /// Planet max health
    pub planet_health: Fixed,
    /// Closest a planet orbits to the star
    pub ring_min: Fixed,
    /// Farthest a planet orbits from the star
    pub ring_max: Fixed,
    /// Tangential speed given to planets
    pub orbit_speed: Fixed,
    /// Economy every participant starts with
    pub starting_economy: EcoStats,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            star_radius: to_fixed(6.0),
            star_mass: to_fixed(200.0),
            star_health: to_fixed(1000.0),
            planet_radius: to_fixed(1.5),
            planet_mass: to_fixed(10.0),
            planet_health: to_fixed(100.0),
            ring_min: to_fixed(16.0),
            ring_max: to_fixed(48.0),
            orbit_speed: to_fixed(0.25),
            starting_economy: EcoStats {
                income: FIXED_ONE,
                projectiles: to_fixed(5.0),
                fire_rate: FIXED_ONE,
                defenses: 0,
            },
        }
    }
}

/// Build the full instruction list for a roster.
pub fn generate_instructions(
    seed: u64,
    participants: &BTreeSet<ParticipantId>,
    config: &GenerationConfig,
) -> Vec<GenerationInstruction> {
    let mut rng = DeterministicRng::new(seed);
    let mut instructions = Vec::with_capacity(1 + participants.len() * 2);

    instructions.push(PlaceBody {
        id: STAR_ID,
        position: FixedVec2::ZERO,
        velocity: FixedVec2::ZERO,
        radius: config.star_radius,
        mass: config.star_mass,
        max_health: config.star_health,
    }.into());

    // Which planet each participant gets is shuffled, so P0 is not always
    // on the first-placed planet.
    let mut slots: Vec<u32> = (1..=participants.len() as u32).collect();
    rng.shuffle(&mut slots);

    for id in 1..=participants.len() as u32 {
        let dir = rng.random_direction();
        let ring = rng.next_fixed_range(config.ring_min, config.ring_max);
        let offset = dir.scale(ring);
        let position = FixedVec2::new(
            fixed_clamp(offset.x, -ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
            fixed_clamp(offset.y, -ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
        );

        instructions.push(PlaceBody {
            id: BodyId(id),
            position,
            velocity: dir.perpendicular().scale(config.orbit_speed),
            radius: config.planet_radius,
            mass: config.planet_mass,
            max_health: config.planet_health,
        }.into());
    }

    for (player, slot) in participants.iter().zip(slots) {
        instructions.push(AssignEconomy {
            player: *player,
            body: BodyId(slot),
            starting: config.starting_economy,
        }.into());
    }

    instructions
}

// =============================================================================
// TESTS
// =============================================================================
