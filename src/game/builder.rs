//! World Builder
//!
//! Applies generation instructions to the world under construction.
//!
//! Every instruction is checked in full before the world is touched, so a
//! rejected instruction leaves the world exactly as it was. Any rejection
//! during a live handshake is fatal: the peers would otherwise diverge.

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::fixed::Fixed;
use crate::game::instruction::{AssignEconomy, GenerationInstruction, PlaceBody};
use crate::game::world::{Body, BodyId, Economy, ParticipantId, World};

/// Why an instruction could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A body with this id was already placed.
    #[error("body {0} already exists")]
    DuplicateBody(BodyId),
    /// The referenced body was never placed.
    #[error("body {0} does not exist")]
    UnknownBody(BodyId),
    /// The participant is not in the roster.
    #[error("{0} is not a session participant")]
    UnknownParticipant(ParticipantId),
    /// The participant already owns an economy.
    #[error("{0} already has an economy")]
    DuplicateEconomy(ParticipantId),
    /// Another economy already lives on the body.
    #[error("body {body} already hosts the economy of {owner}")]
    BodyAlreadyOwned {
        /// Contested body
        body: BodyId,
        /// Current owner
        owner: ParticipantId,
    },
    /// Radius, mass or max health is not positive.
    #[error("invalid body {id}: {reason}")]
    InvalidBody {
        /// Body being placed
        id: BodyId,
        /// Which field is out of range
        reason: &'static str,
    },
}

/// Apply one instruction to `world`.
pub fn apply_instruction(world: &mut World, instruction: &GenerationInstruction) -> Result<(), BuildError> {
    match instruction {
        GenerationInstruction::PlaceBody(place) => place_body(world, place),
        GenerationInstruction::AssignEconomy(assign) => assign_economy(world, assign),
    }
}

fn place_body(world: &mut World, place: &PlaceBody) -> Result<(), BuildError> {
    if world.bodies.contains_key(&place.id) {
        return Err(BuildError::DuplicateBody(place.id));
    }
    require_positive(place.id, place.radius, "radius must be positive")?;
    require_positive(place.id, place.mass, "mass must be positive")?;
    require_positive(place.id, place.max_health, "max health must be positive")?;

    world.bodies.insert(place.id, Body {
        id: place.id,
        position: place.position,
        velocity: place.velocity,
        radius: place.radius,
        mass: place.mass,
        health: place.max_health,
        max_health: place.max_health,
    });

    debug!(body = %place.id, position = %place.position, "Placed body");
    Ok(())
}

fn assign_economy(world: &mut World, assign: &AssignEconomy) -> Result<(), BuildError> {
    if !world.is_participant(assign.player) {
        return Err(BuildError::UnknownParticipant(assign.player));
    }
    if world.economies.contains_key(&assign.player) {
        return Err(BuildError::DuplicateEconomy(assign.player));
    }
    if !world.bodies.contains_key(&assign.body) {
        return Err(BuildError::UnknownBody(assign.body));
    }
    if let Some(existing) = world.economy_on(assign.body) {
        return Err(BuildError::BodyAlreadyOwned { body: assign.body, owner: existing.player });
    }

    world.economies.insert(assign.player, Economy {
        player: assign.player,
        body: assign.body,
        stats: assign.starting,
        shots_fired: 0,
    });

    debug!(player = %assign.player, body = %assign.body, "Assigned economy");
    Ok(())
}

fn require_positive(id: BodyId, value: Fixed, reason: &'static str) -> Result<(), BuildError> {
    if value > 0 {
        Ok(())
    } else {
        Err(BuildError::InvalidBody { id, reason })
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// The world under construction plus a count of applied instructions.
///
/// Owned by the handshake while generating; `finish` hands the world over
/// once the handshake reaches Running.
#[derive(Debug, Clone)]
pub struct WorldBuilder {
    world: World,
    applied: usize,
}

impl WorldBuilder {
    /// Start from an empty world for the given roster.
    pub fn new(participants: BTreeSet<ParticipantId>) -> Self {
        Self {
            world: World::new(participants),
            applied: 0,
        }
    }

    /// Apply the next instruction in order.
    pub fn apply(&mut self, instruction: &GenerationInstruction) -> Result<(), BuildError> {
        apply_instruction(&mut self.world, instruction)?;
        self.applied += 1;
        Ok(())
    }

    /// Number of instructions applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Read-only view of the world so far.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Consume the builder and return the finished world.
    pub fn finish(self) -> World {
        self.world
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::core::fixed::{to_fixed, FIXED_ONE};
    use crate::core::vec2::FixedVec2;
    use crate::game::world::EcoStats;

    fn roster(ids: &[u8]) -> BTreeSet<ParticipantId> {
        ids.iter().copied().map(ParticipantId).collect()
    }

    fn place(id: u32, x: i32, y: i32) -> GenerationInstruction {
        PlaceBody {
            id: BodyId(id),
            position: FixedVec2::from_ints(x, y),
            velocity: FixedVec2::ZERO,
            radius: FIXED_ONE,
            mass: FIXED_ONE,
            max_health: to_fixed(100.0),
        }.into()
    }

    fn assign(player: u8, body: u32) -> GenerationInstruction {
        AssignEconomy {
            player: ParticipantId(player),
            body: BodyId(body),
            starting: EcoStats { projectiles: to_fixed(5.0), ..Default::default() },
        }.into()
    }

    #[test]
    fn test_place_body_starts_at_full_health() {
        let mut builder = WorldBuilder::new(roster(&[0]));
        builder.apply(&place(1, 0, 0)).unwrap();

        let body = builder.world().body(BodyId(1)).unwrap();
        assert_eq!(body.position, FixedVec2::ZERO);
        assert_eq!(body.health, body.max_health);
        assert_eq!(builder.applied(), 1);
    }

    #[test]
    fn test_duplicate_body_rejected_without_mutation() {
        let mut builder = WorldBuilder::new(roster(&[0]));
        builder.apply(&place(1, 0, 0)).unwrap();
        let before = builder.world().clone();

        assert_eq!(builder.apply(&place(1, 5, 5)), Err(BuildError::DuplicateBody(BodyId(1))));
        assert_eq!(builder.world(), &before);
        assert_eq!(builder.applied(), 1);
    }

    #[test]
    fn test_invalid_body_dimensions() {
        let mut world = World::new(roster(&[0]));
        let bad = PlaceBody {
            id: BodyId(3),
            position: FixedVec2::ZERO,
            velocity: FixedVec2::ZERO,
            radius: 0,
            mass: FIXED_ONE,
            max_health: FIXED_ONE,
        };
        let result = apply_instruction(&mut world, &bad.into());
        assert!(matches!(result, Err(BuildError::InvalidBody { id: BodyId(3), .. })));
        assert!(world.bodies.is_empty());
    }

    #[test]
    fn test_assign_economy_errors() {
        let mut builder = WorldBuilder::new(roster(&[0, 1]));
        builder.apply(&place(1, 0, 0)).unwrap();
        builder.apply(&place(2, 10, 0)).unwrap();

        assert_eq!(builder.apply(&assign(7, 1)), Err(BuildError::UnknownParticipant(ParticipantId(7))));
        assert_eq!(builder.apply(&assign(0, 9)), Err(BuildError::UnknownBody(BodyId(9))));

        builder.apply(&assign(0, 1)).unwrap();
        assert_eq!(builder.apply(&assign(0, 2)), Err(BuildError::DuplicateEconomy(ParticipantId(0))));
        assert_eq!(
            builder.apply(&assign(1, 1)),
            Err(BuildError::BodyAlreadyOwned { body: BodyId(1), owner: ParticipantId(0) }),
        );

        let world = builder.finish();
        assert_eq!(world.economy(ParticipantId(0)).map(|e| e.body), Some(BodyId(1)));
        assert!(world.economy(ParticipantId(1)).is_none());
    }

    fn arb_instruction() -> impl Strategy<Value = GenerationInstruction> {
        prop_oneof![
            (0u32..6, -100i32..100, -100i32..100, -2i32..4).prop_map(|(id, x, y, r)| {
                PlaceBody {
                    id: BodyId(id),
                    position: FixedVec2::from_ints(x, y),
                    velocity: FixedVec2::new(x * 7, y * 3),
                    radius: r * FIXED_ONE,
                    mass: FIXED_ONE,
                    max_health: to_fixed(10.0),
                }.into()
            }),
            (0u8..4, 0u32..6, 0i32..20).prop_map(|(player, body, stock)| {
                AssignEconomy {
                    player: ParticipantId(player),
                    body: BodyId(body),
                    starting: EcoStats { projectiles: stock * FIXED_ONE, ..Default::default() },
                }.into()
            }),
        ]
    }

    proptest! {
        #[test]
        fn test_same_instructions_same_world(instructions in prop::collection::vec(arb_instruction(), 0..40)) {
            let mut a = World::new(roster(&[0, 1, 2]));
            let mut b = World::new(roster(&[0, 1, 2]));

            for instruction in &instructions {
                let ra = apply_instruction(&mut a, instruction);
                let rb = apply_instruction(&mut b, instruction);
                prop_assert_eq!(ra, rb);
            }

            prop_assert_eq!(a.compute_hash(), b.compute_hash());
            prop_assert_eq!(a, b);
        }
    }
}
