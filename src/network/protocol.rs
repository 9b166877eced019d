//! Protocol Messages
//!
//! Wire format shared by all peers. Each frame is a one-byte kind tag
//! followed by a bincode payload:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────┐
//! │ kind: u8 │ payload (fixint, little-endian, exact)   │
//! └──────────┴──────────────────────────────────────────┘
//! ```
//!
//! The kind set is closed and matched exhaustively. Decoding is total: an
//! unknown kind, a short payload or leftover bytes all produce a
//! `DecodeError`, never a partially filled message.

use std::fmt;
use bincode::Options;
use serde::{Serialize, Deserialize};

use crate::game::command::{CommandAction, CommandRequest, FireProjectile};
use crate::game::instruction::{AssignEconomy, GenerationInstruction, PlaceBody};
use crate::game::world::ParticipantId;

// =============================================================================
// KINDS
// =============================================================================

/// One-byte frame discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Place a body (generation)
    PlaceBody = 0x01,
    /// Assign an economy (generation)
    AssignEconomy = 0x02,
    /// End of the author's instruction stream
    FinishGenerating = 0x0F,
    /// Sender finished building its world
    PlayerReady = 0x10,
    /// Sender failed to build its world; the session cannot start
    GenerationFailed = 0x11,
    /// Fire a projectile (running)
    FireProjectile = 0x20,
    /// Fire a debug particle (running, debug builds only)
    #[cfg(feature = "debug-commands")]
    DebugFireParticle = 0x7F,
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(MessageKind::PlaceBody),
            0x02 => Ok(MessageKind::AssignEconomy),
            0x0F => Ok(MessageKind::FinishGenerating),
            0x10 => Ok(MessageKind::PlayerReady),
            0x11 => Ok(MessageKind::GenerationFailed),
            0x20 => Ok(MessageKind::FireProjectile),
            #[cfg(feature = "debug-commands")]
            0x7F => Ok(MessageKind::DebugFireParticle),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, *self as u8)
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A world-construction step
    Instruction(GenerationInstruction),
    /// The author has sent every instruction
    FinishGenerating,
    /// Readiness signal
    PlayerReady,
    /// The sender's World Builder rejected an instruction
    GenerationFailed,
    /// A synced command
    Command(CommandRequest),
}

impl Message {
    /// Frame discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Instruction(GenerationInstruction::PlaceBody(_)) => MessageKind::PlaceBody,
            Message::Instruction(GenerationInstruction::AssignEconomy(_)) => MessageKind::AssignEconomy,
            Message::FinishGenerating => MessageKind::FinishGenerating,
            Message::PlayerReady => MessageKind::PlayerReady,
            Message::GenerationFailed => MessageKind::GenerationFailed,
            Message::Command(request) => match request.action {
                CommandAction::FireProjectile(_) => MessageKind::FireProjectile,
                #[cfg(feature = "debug-commands")]
                CommandAction::DebugFireParticle(_) => MessageKind::DebugFireParticle,
            },
        }
    }
}

impl From<GenerationInstruction> for Message {
    fn from(instruction: GenerationInstruction) -> Self {
        Message::Instruction(instruction)
    }
}

impl From<CommandRequest> for Message {
    fn from(request: CommandRequest) -> Self {
        Message::Command(request)
    }
}

/// Command payload as it travels: origin, submission time, action fields.
#[derive(Serialize, Deserialize)]
struct CommandPayload {
    origin: ParticipantId,
    submitted_at: u32,
    fire: FireProjectile,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// bincode refused the payload.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] bincode::Error),
}

/// Decoding failures. The frame is discarded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Zero-length frame.
    #[error("empty frame")]
    Empty,
    /// Kind byte outside the known set.
    #[error("unknown message kind 0x{0:02X}")]
    UnknownKind(u8),
    /// Payload short, long or malformed for its kind.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        /// Kind byte of the frame
        kind: MessageKind,
        /// bincode's verdict
        #[source]
        source: bincode::Error,
    },
    /// Payload bytes after a payload-less kind.
    #[error("{kind} carries no payload but {len} bytes followed")]
    TrailingBytes {
        /// Kind byte of the frame
        kind: MessageKind,
        /// Bytes after the kind byte
        len: usize,
    },
}

/// A well-formed message that arrived at the wrong time or from the wrong
/// peer. Discarded and logged, never applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Generation message after this peer finished generating.
    #[error("{kind} received after generation finished")]
    GenerationMessageAfterFinish {
        /// Offending kind
        kind: MessageKind,
    },
    /// Generation message from a follower.
    #[error("{kind} from a peer other than the author {author}")]
    NotTheAuthor {
        /// Offending kind
        kind: MessageKind,
        /// The configured author
        author: ParticipantId,
    },
    /// Generation message sent to the author.
    #[error("{kind} received by the generation author")]
    AuthorReceivedGeneration {
        /// Offending kind
        kind: MessageKind,
    },
    /// Sender outside the roster.
    #[error("sender is not a session participant")]
    UnknownParticipant,
    /// Second readiness signal from the same sender.
    #[error("duplicate readiness signal")]
    DuplicateReady,
    /// Command while this peer is still generating. No peer can be
    /// running before this peer's readiness signal went out.
    #[error("command received while still generating")]
    CommandWhileGenerating,
    /// Command origin differs from its sender.
    #[error("command claims origin {claimed}")]
    OriginMismatch {
        /// Origin named in the payload
        claimed: ParticipantId,
    },
    /// Remote command claiming to be ours.
    #[error("command echoes the local participant")]
    EchoedLocalCommand,
}

// =============================================================================
// CODEC
// =============================================================================

fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Encode a message into a frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut frame = vec![message.kind() as u8];
    match message {
        Message::Instruction(GenerationInstruction::PlaceBody(place)) => {
            frame.extend(wire().serialize(place)?);
        }
        Message::Instruction(GenerationInstruction::AssignEconomy(assign)) => {
            frame.extend(wire().serialize(assign)?);
        }
        Message::FinishGenerating | Message::PlayerReady | Message::GenerationFailed => {}
        Message::Command(request) => {
            let fire = match request.action {
                CommandAction::FireProjectile(fire) => fire,
                #[cfg(feature = "debug-commands")]
                CommandAction::DebugFireParticle(fire) => fire,
            };
            frame.extend(wire().serialize(&CommandPayload {
                origin: request.origin,
                submitted_at: request.submitted_at,
                fire,
            })?);
        }
    }
    Ok(frame)
}

/// Decode a whole frame.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    let (&kind, payload) = frame.split_first().ok_or(DecodeError::Empty)?;
    decode_payload(MessageKind::try_from(kind)?, payload)
}

/// Decode the payload for an already-read kind.
pub fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<Message, DecodeError> {
    let malformed = |source: bincode::Error| DecodeError::Payload { kind, source };

    match kind {
        MessageKind::PlaceBody => {
            let place: PlaceBody = wire().deserialize(payload).map_err(malformed)?;
            Ok(Message::Instruction(place.into()))
        }
        MessageKind::AssignEconomy => {
            let assign: AssignEconomy = wire().deserialize(payload).map_err(malformed)?;
            Ok(Message::Instruction(assign.into()))
        }
        MessageKind::FinishGenerating => empty(kind, payload, Message::FinishGenerating),
        MessageKind::PlayerReady => empty(kind, payload, Message::PlayerReady),
        MessageKind::GenerationFailed => empty(kind, payload, Message::GenerationFailed),
        MessageKind::FireProjectile => {
            let p: CommandPayload = wire().deserialize(payload).map_err(malformed)?;
            Ok(Message::Command(CommandRequest {
                origin: p.origin,
                submitted_at: p.submitted_at,
                action: CommandAction::FireProjectile(p.fire),
            }))
        }
        #[cfg(feature = "debug-commands")]
        MessageKind::DebugFireParticle => {
            let p: CommandPayload = wire().deserialize(payload).map_err(malformed)?;
            Ok(Message::Command(CommandRequest {
                origin: p.origin,
                submitted_at: p.submitted_at,
                action: CommandAction::DebugFireParticle(p.fire),
            }))
        }
    }
}

fn empty(kind: MessageKind, payload: &[u8], message: Message) -> Result<Message, DecodeError> {
    if payload.is_empty() {
        Ok(message)
    } else {
        Err(DecodeError::TrailingBytes { kind, len: payload.len() })
    }
}

// =============================================================================
// TESTS
// =============================================================================
