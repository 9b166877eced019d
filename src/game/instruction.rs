//! Generation Instructions
//!
//! One atomic step of world construction each. The author produces them,
//! every peer applies them in the author's order through the World Builder.

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::world::{BodyId, EcoStats, ParticipantId};

/// Place a celestial body in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceBody {
    /// Id of the new body (unique)
    pub id: BodyId,
    /// Center position
    pub position: FixedVec2,
    /// Initial velocity
    pub velocity: FixedVec2,
    /// Radius (> 0)
    pub radius: Fixed,
    /// Mass (> 0)
    pub mass: Fixed,
    /// Max health (> 0); bodies start at full health
    pub max_health: Fixed,
}

/// Give a participant their economy on an existing body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignEconomy {
    /// Participant receiving the economy
    pub player: ParticipantId,
    /// Home body
    pub body: BodyId,
    /// Starting values
    pub starting: EcoStats,
}

/// A world-construction step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationInstruction {
    /// Place a body
    PlaceBody(PlaceBody),
    /// Assign an economy
    AssignEconomy(AssignEconomy),
}

impl GenerationInstruction {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            GenerationInstruction::PlaceBody(_) => "PlaceBody",
            GenerationInstruction::AssignEconomy(_) => "AssignEconomy",
        }
    }
}

impl From<PlaceBody> for GenerationInstruction {
    fn from(place: PlaceBody) -> Self {
        GenerationInstruction::PlaceBody(place)
    }
}

impl From<AssignEconomy> for GenerationInstruction {
    fn from(assign: AssignEconomy) -> Self {
        GenerationInstruction::AssignEconomy(assign)
    }
}
