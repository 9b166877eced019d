//! Generation Handshake
//!
//! Per-peer state machine that builds the shared world and confirms every
//! peer built it before simulation starts.
//!
//! ```text
//! ┌────────────┐ finish generating ┌───────────────────┐ all ready ┌─────────┐
//! │ Generating │ ────────────────▶ │ AwaitingPeerReady │ ────────▶ │ Running │
//! └────────────┘  (send PlayerReady)└───────────────────┘           └─────────┘
//! ```
//!
//! Transitions only go forward. While Generating, instructions go to the
//! World Builder in receipt order; PlayerReady signals that arrive early are
//! recorded and honoured later. Once generation is finished, any further
//! generation message is a protocol violation and is never applied.
//!
//! A peer that already runs may send commands while this peer still waits
//! for someone else's readiness signal. Those are held, in arrival order,
//! for whoever applies commands once the world is live.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::game::builder::{BuildError, WorldBuilder};
use crate::game::command::CommandRequest;
use crate::game::instruction::GenerationInstruction;
use crate::game::world::{ParticipantId, World};
use crate::network::protocol::{decode, encode, DecodeError, EncodeError, Message, ProtocolViolation};
use crate::network::transport::{DeliveryMode, Transport, TransportError};

/// Handshake phase of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Building the world
    Generating,
    /// World built, waiting for everyone else's readiness signal
    AwaitingPeerReady,
    /// Everyone is ready; the world belongs to the simulation now
    Running,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Generating => write!(f, "Generating"),
            HandshakeState::AwaitingPeerReady => write!(f, "AwaitingPeerReady"),
            HandshakeState::Running => write!(f, "Running"),
        }
    }
}

/// Who produces the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRole {
    /// This peer produces the instructions, applies them and sends them
    Author {
        /// Complete instruction list, applied and sent in order
        instructions: Vec<GenerationInstruction>,
    },
    /// This peer applies what the author sends
    Follower {
        /// The only peer allowed to send generation messages
        author: ParticipantId,
    },
}

/// Handshake failures.
///
/// `ProtocolViolation` and `Decode` are reported and otherwise ignored; the
/// rest end the handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Message dropped as a protocol violation.
    #[error("protocol violation from {from}: {violation}")]
    ProtocolViolation {
        /// Sender
        from: ParticipantId,
        /// What was wrong
        violation: ProtocolViolation,
    },
    /// Frame could not be decoded.
    #[error("undecodable frame from {from}: {source}")]
    Decode {
        /// Sender
        from: ParticipantId,
        /// Decoder verdict
        #[source]
        source: DecodeError,
    },
    /// Local World Builder rejected an instruction.
    #[error("generation instruction #{index} could not be applied: {source}")]
    Generation {
        /// Position in the instruction stream
        index: usize,
        /// Builder verdict
        #[source]
        source: BuildError,
    },
    /// A peer announced its generation failed.
    #[error("{0} failed to build its world")]
    PeerAborted(ParticipantId),
    /// Outgoing message could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Outgoing message could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandshakeError {
    /// Does this error end the handshake?
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HandshakeError::ProtocolViolation { .. } | HandshakeError::Decode { .. })
    }
}

type RunningCallback = Box<dyn FnOnce(&World) + Send + 'static>;

/// The generation handshake of one peer.
pub struct Handshake {
    local_id: ParticipantId,
    participants: BTreeSet<ParticipantId>,
    role: GenerationRole,
    state: HandshakeState,
    builder: Option<WorldBuilder>,
    world: Option<World>,
    ready: BTreeSet<ParticipantId>,
    on_running: Option<RunningCallback>,
    held_commands: VecDeque<(ParticipantId, CommandRequest)>,
    started: bool,
    failed: bool,
}

impl Handshake {
    /// Create a handshake for `local_id` within a fixed roster.
    pub fn new(local_id: ParticipantId, participants: BTreeSet<ParticipantId>, role: GenerationRole) -> Self {
        Self {
            local_id,
            builder: Some(WorldBuilder::new(participants.clone())),
            participants,
            role,
            state: HandshakeState::Generating,
            world: None,
            ready: BTreeSet::new(),
            on_running: None,
            held_commands: VecDeque::new(),
            started: false,
            failed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Has the handshake reached Running?
    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Running
    }

    /// Has a fatal generation error occurred?
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Participants whose readiness signal is still outstanding.
    pub fn pending_ready(&self) -> BTreeSet<ParticipantId> {
        self.participants.difference(&self.ready).copied().collect()
    }

    /// Instructions applied to the local world so far.
    pub fn instructions_applied(&self) -> usize {
        self.builder.as_ref().map_or(0, WorldBuilder::applied)
    }

    /// Register the callback run when Running is entered.
    ///
    /// Runs exactly once. If Running was already entered and the world is
    /// still held here, it runs immediately.
    pub fn on_enter_running<F>(&mut self, callback: F)
    where
        F: FnOnce(&World) + Send + 'static,
    {
        match (&self.state, &self.world) {
            (HandshakeState::Running, Some(world)) => callback(world),
            _ => self.on_running = Some(Box::new(callback)),
        }
    }

    /// Take the finished world. Only yields once, and only when Running.
    pub fn take_world(&mut self) -> Option<World> {
        self.world.take()
    }

    /// Commands received after the local world was built, with their
    /// senders, in arrival order. Nothing here has been validated yet.
    pub fn take_held_commands(&mut self) -> VecDeque<(ParticipantId, CommandRequest)> {
        std::mem::take(&mut self.held_commands)
    }

    /// Number of commands waiting for the world to go live.
    pub fn held_commands(&self) -> usize {
        self.held_commands.len()
    }

    /// Kick off generation.
    ///
    /// An author applies and sends its whole instruction list, then
    /// `FinishGenerating`, then its readiness signal. A follower waits.
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), HandshakeError> {
        if self.started || self.failed {
            return Ok(());
        }
        self.started = true;

        let instructions = match &mut self.role {
            GenerationRole::Author { instructions } => std::mem::take(instructions),
            GenerationRole::Follower { author } => {
                info!(participant = %self.local_id, author = %author, "Waiting for generation instructions");
                return Ok(());
            }
        };

        info!(participant = %self.local_id, count = instructions.len(), "Generating world as author");
        for instruction in &instructions {
            self.apply(instruction, transport)?;
            let frame = encode(&Message::Instruction(*instruction))?;
            transport.send(&frame, DeliveryMode::ReliableOrdered)?;
        }
        transport.send(&encode(&Message::FinishGenerating)?, DeliveryMode::ReliableOrdered)?;
        self.finish_generating(transport)
    }

    /// Decode a raw frame from `from` and handle it.
    pub fn submit_incoming<T: Transport + ?Sized>(
        &mut self,
        from: ParticipantId,
        raw: &[u8],
        transport: &mut T,
    ) -> Result<(), HandshakeError> {
        let message = decode(raw).map_err(|source| HandshakeError::Decode { from, source })?;
        self.handle(from, message, transport)
    }

    /// Handle an already decoded message from `from`.
    pub fn handle<T: Transport + ?Sized>(
        &mut self,
        from: ParticipantId,
        message: Message,
        transport: &mut T,
    ) -> Result<(), HandshakeError> {
        #[cfg(feature = "debug-tracing")]
        trace!(participant = %self.local_id, from = %from, kind = %message.kind(), state = %self.state, "Handshake message");

        let violation = |violation: ProtocolViolation| HandshakeError::ProtocolViolation { from, violation };

        if !self.participants.contains(&from) || from == self.local_id {
            return Err(violation(ProtocolViolation::UnknownParticipant));
        }
        if self.failed {
            debug!(participant = %self.local_id, from = %from, "Handshake failed, dropping message");
            return Ok(());
        }

        match message {
            Message::Instruction(_) | Message::FinishGenerating => {
                let kind = message.kind();
                if self.state != HandshakeState::Generating {
                    return Err(violation(ProtocolViolation::GenerationMessageAfterFinish { kind }));
                }
                match self.role {
                    GenerationRole::Author { .. } => {
                        return Err(violation(ProtocolViolation::AuthorReceivedGeneration { kind }));
                    }
                    GenerationRole::Follower { author } if author != from => {
                        return Err(violation(ProtocolViolation::NotTheAuthor { kind, author }));
                    }
                    GenerationRole::Follower { .. } => {}
                }
                match message {
                    Message::Instruction(instruction) => self.apply(&instruction, transport),
                    _ => self.finish_generating(transport),
                }
            }
            Message::PlayerReady => {
                if !self.ready.insert(from) {
                    return Err(violation(ProtocolViolation::DuplicateReady));
                }
                match self.state {
                    HandshakeState::Generating => {
                        debug!(participant = %self.local_id, peer = %from, "Buffered early readiness signal");
                        Ok(())
                    }
                    _ => {
                        debug!(participant = %self.local_id, peer = %from, "Peer ready");
                        self.try_enter_running();
                        Ok(())
                    }
                }
            }
            Message::GenerationFailed => {
                if self.state == HandshakeState::Running {
                    return Err(violation(ProtocolViolation::GenerationMessageAfterFinish {
                        kind: message.kind(),
                    }));
                }
                self.failed = true;
                warn!(participant = %self.local_id, peer = %from, "Peer failed to build its world");
                Err(HandshakeError::PeerAborted(from))
            }
            Message::Command(request) => {
                if self.state == HandshakeState::Generating {
                    return Err(violation(ProtocolViolation::CommandWhileGenerating));
                }
                debug!(
                    participant = %self.local_id,
                    from = %from,
                    command = request.name(),
                    pending = self.pending_ready().len(),
                    "Holding command until running"
                );
                self.held_commands.push_back((from, request));
                Ok(())
            }
        }
    }

    fn apply<T: Transport + ?Sized>(
        &mut self,
        instruction: &GenerationInstruction,
        transport: &mut T,
    ) -> Result<(), HandshakeError> {
        let Some(builder) = self.builder.as_mut() else {
            return Ok(());
        };
        let index = builder.applied();
        match builder.apply(instruction) {
            Ok(()) => Ok(()),
            Err(source) => {
                self.failed = true;
                warn!(
                    participant = %self.local_id,
                    index,
                    instruction = instruction.name(),
                    error = %source,
                    "World Builder rejected instruction"
                );
                let notified = encode(&Message::GenerationFailed)
                    .map_err(HandshakeError::from)
                    .and_then(|frame| Ok(transport.send(&frame, DeliveryMode::ReliableOrdered)?));
                if let Err(e) = notified {
                    warn!(participant = %self.local_id, error = %e, "Could not announce generation failure");
                }
                Err(HandshakeError::Generation { index, source })
            }
        }
    }

    fn finish_generating<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), HandshakeError> {
        self.state = HandshakeState::AwaitingPeerReady;
        self.ready.insert(self.local_id);
        info!(
            participant = %self.local_id,
            instructions = self.instructions_applied(),
            pending = self.pending_ready().len(),
            "World built, awaiting peers"
        );

        transport.send(&encode(&Message::PlayerReady)?, DeliveryMode::ReliableOrdered)?;
        self.try_enter_running();
        Ok(())
    }

    fn try_enter_running(&mut self) {
        if self.state != HandshakeState::AwaitingPeerReady || !self.pending_ready().is_empty() {
            return;
        }
        let Some(builder) = self.builder.take() else {
            return;
        };

        let world = builder.finish();
        self.state = HandshakeState::Running;
        info!(
            participant = %self.local_id,
            bodies = world.bodies.len(),
            world_hash = %hex::encode(&world.compute_hash()[..8]),
            "All peers ready, running"
        );

        if let Some(callback) = self.on_running.take() {
            callback(&world);
        }
        self.world = Some(world);
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("local_id", &self.local_id)
            .field("state", &self.state)
            .field("ready", &self.ready)
            .field("held_commands", &self.held_commands.len())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::core::fixed::{to_fixed, FIXED_ONE};
    use crate::core::vec2::FixedVec2;
    use crate::game::instruction::PlaceBody;
    use crate::game::world::BodyId;
    use crate::game::command::CommandRequest;
    use crate::network::transport::scripted::ScriptedTransport;
    use crate::network::transport::{LocalNetwork, LocalTransport, TransportEvent};

    const A: ParticipantId = ParticipantId(0);
    const B: ParticipantId = ParticipantId(1);
    const C: ParticipantId = ParticipantId(2);

    fn roster(ids: &[ParticipantId]) -> BTreeSet<ParticipantId> {
        ids.iter().copied().collect()
    }

    fn place(id: u32) -> GenerationInstruction {
        PlaceBody {
            id: BodyId(id),
            position: FixedVec2::ZERO,
            velocity: FixedVec2::ZERO,
            radius: FIXED_ONE,
            mass: FIXED_ONE,
            max_health: to_fixed(10.0),
        }.into()
    }

    /// Drain everything the transport has and feed it to the handshake.
    fn drain(handshake: &mut Handshake, transport: &mut LocalTransport) -> Vec<HandshakeError> {
        let mut errors = Vec::new();
        while let Some(event) = transport.poll() {
            if let TransportEvent::Message { from, bytes } = event {
                if let Err(e) = handshake.submit_incoming(from, &bytes, transport) {
                    errors.push(e);
                }
            }
        }
        errors
    }

    #[test]
    fn test_two_peer_scenario() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let players = roster(&[A, B]);
        let mut a = Handshake::new(A, players.clone(), GenerationRole::Author { instructions: vec![place(1)] });
        let mut b = Handshake::new(B, players, GenerationRole::Follower { author: A });

        a.start(&mut ta).unwrap();
        b.start(&mut tb).unwrap();
        assert_eq!(a.state(), HandshakeState::AwaitingPeerReady);
        assert_eq!(b.state(), HandshakeState::Generating);

        assert!(drain(&mut b, &mut tb).is_empty());
        assert!(b.is_ready());
        assert!(!a.is_ready());

        assert!(drain(&mut a, &mut ta).is_empty());
        assert!(a.is_ready());

        let wa = a.take_world().unwrap();
        let wb = b.take_world().unwrap();
        assert_eq!(wa.bodies.len(), 1);
        assert_eq!(wa.body(BodyId(1)).map(|b| b.position), Some(FixedVec2::ZERO));
        assert_eq!(wa, wb);
        assert!(a.take_world().is_none());
    }

    #[test]
    fn test_not_running_until_every_peer_ready() {
        let mut mesh = LocalNetwork::mesh(&[A, B, C]);
        let mut tc = mesh.pop().unwrap();
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let players = roster(&[A, B, C]);
        let mut a = Handshake::new(A, players.clone(), GenerationRole::Author { instructions: vec![place(1)] });
        let mut b = Handshake::new(B, players.clone(), GenerationRole::Follower { author: A });
        let mut c = Handshake::new(C, players, GenerationRole::Follower { author: A });

        let entered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entered);
        a.on_enter_running(move |world| {
            assert_eq!(world.bodies.len(), 1);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        a.start(&mut ta).unwrap();
        drain(&mut b, &mut tb);
        drain(&mut a, &mut ta);
        // C has not built anything yet
        assert_eq!(a.state(), HandshakeState::AwaitingPeerReady);
        assert_eq!(a.pending_ready(), roster(&[C]));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        drain(&mut c, &mut tc);
        drain(&mut a, &mut ta);
        drain(&mut b, &mut tb);
        assert!(a.is_ready() && b.is_ready() && c.is_ready());
        assert_eq!(entered.load(Ordering::SeqCst), 1);

        // Nothing more arrives, nothing re-fires
        drain(&mut a, &mut ta);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_early_ready_is_buffered() {
        let mut mesh = LocalNetwork::mesh(&[A, B, C]);
        let mut tc = mesh.pop().unwrap();
        let mut tb = mesh.pop().unwrap();
        let _ta = mesh.pop().unwrap();

        let mut b = Handshake::new(B, roster(&[A, B, C]), GenerationRole::Follower { author: A });

        // C's readiness reaches B before B has seen a single instruction
        let ready = encode(&Message::PlayerReady).unwrap();
        b.submit_incoming(C, &ready, &mut tb).unwrap();
        b.submit_incoming(A, &ready, &mut tb).unwrap();
        assert_eq!(b.state(), HandshakeState::Generating);
        assert!(b.pending_ready().contains(&B));

        let instruction = encode(&Message::Instruction(place(1))).unwrap();
        b.submit_incoming(A, &instruction, &mut tb).unwrap();
        assert_eq!(b.state(), HandshakeState::Generating);

        let finish = encode(&Message::FinishGenerating).unwrap();
        b.submit_incoming(A, &finish, &mut tb).unwrap();
        assert!(b.is_ready());

        // B's own readiness went out to C
        assert!(matches!(tc.poll(), Some(TransportEvent::Message { from: B, .. })));
    }

    #[test]
    fn test_instruction_after_finish_rejected() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let players = roster(&[A, B]);
        let mut a = Handshake::new(A, players.clone(), GenerationRole::Author { instructions: vec![place(1)] });
        let mut b = Handshake::new(B, players, GenerationRole::Follower { author: A });
        a.start(&mut ta).unwrap();
        drain(&mut b, &mut tb);
        assert!(b.is_ready());

        let late = encode(&Message::Instruction(place(2))).unwrap();
        let err = b.submit_incoming(A, &late, &mut tb).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::ProtocolViolation {
                violation: ProtocolViolation::GenerationMessageAfterFinish { .. },
                ..
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(b.take_world().map(|w| w.bodies.len()), Some(1));
    }

    #[test]
    fn test_instruction_from_non_author_rejected() {
        let mut mesh = LocalNetwork::mesh(&[A, B, C]);
        let _tc = mesh.pop().unwrap();
        let mut tb = mesh.pop().unwrap();

        let mut b = Handshake::new(B, roster(&[A, B, C]), GenerationRole::Follower { author: A });
        let frame = encode(&Message::Instruction(place(1))).unwrap();
        let err = b.submit_incoming(C, &frame, &mut tb).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::ProtocolViolation { violation: ProtocolViolation::NotTheAuthor { .. }, .. }
        ));
        assert_eq!(b.instructions_applied(), 0);
    }

    #[test]
    fn test_duplicate_and_unknown_ready() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();

        let mut b = Handshake::new(B, roster(&[A, B]), GenerationRole::Follower { author: A });
        let ready = encode(&Message::PlayerReady).unwrap();
        b.submit_incoming(A, &ready, &mut tb).unwrap();

        let dup = b.submit_incoming(A, &ready, &mut tb).unwrap_err();
        assert!(matches!(dup, HandshakeError::ProtocolViolation { violation: ProtocolViolation::DuplicateReady, .. }));

        let stranger = b.submit_incoming(ParticipantId(9), &ready, &mut tb).unwrap_err();
        assert!(matches!(
            stranger,
            HandshakeError::ProtocolViolation { violation: ProtocolViolation::UnknownParticipant, .. }
        ));
    }

    #[test]
    fn test_build_failure_notifies_peers() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let players = roster(&[A, B]);
        let mut a = Handshake::new(A, players.clone(), GenerationRole::Author { instructions: vec![place(1)] });
        let mut b = Handshake::new(B, players, GenerationRole::Follower { author: A });
        a.start(&mut ta).unwrap();

        // B already has body 1 from somewhere, so the author's PlaceBody clashes
        b.handle(A, Message::Instruction(place(1)), &mut tb).unwrap();
        let errors = drain(&mut b, &mut tb);
        assert!(matches!(errors.first(), Some(HandshakeError::Generation { index: 1, .. })));
        assert!(b.has_failed());

        let errors = drain(&mut a, &mut ta);
        assert!(matches!(errors.first(), Some(HandshakeError::PeerAborted(p)) if *p == B));
        assert!(errors[0].is_fatal());
        assert!(!a.is_ready());
    }

    #[test]
    fn test_single_participant_runs_immediately() {
        let mut mesh = LocalNetwork::mesh(&[A]);
        let mut ta = mesh.pop().unwrap();
        let mut a = Handshake::new(A, roster(&[A]), GenerationRole::Author { instructions: vec![place(1)] });
        a.start(&mut ta).unwrap();
        assert!(a.is_ready());

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        a.on_enter_running(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_command_held_until_running() {
        let mut transport = ScriptedTransport::new(B);
        let mut b = Handshake::new(B, roster(&[A, B, C]), GenerationRole::Follower { author: A });
        let fire = CommandRequest::fire(A, 3, BodyId(1), FixedVec2::UP);

        b.handle(A, Message::Instruction(place(1)), &mut transport).unwrap();
        b.handle(A, Message::FinishGenerating, &mut transport).unwrap();
        b.handle(A, Message::PlayerReady, &mut transport).unwrap();

        // A is already running (it has C's readiness); C's own signal to B is slower
        b.handle(A, Message::Command(fire), &mut transport).unwrap();
        assert_eq!(b.state(), HandshakeState::AwaitingPeerReady);
        assert_eq!(b.held_commands(), 1);

        b.handle(C, Message::PlayerReady, &mut transport).unwrap();
        assert!(b.is_ready());

        let held: Vec<_> = b.take_held_commands().into_iter().collect();
        assert_eq!(held, vec![(A, fire)]);
        assert_eq!(b.held_commands(), 0);
    }

    #[test]
    fn test_command_while_generating_rejected() {
        let mut transport = ScriptedTransport::new(B);
        let mut b = Handshake::new(B, roster(&[A, B]), GenerationRole::Follower { author: A });

        let fire = CommandRequest::fire(A, 0, BodyId(1), FixedVec2::UP);
        let err = b.handle(A, Message::Command(fire), &mut transport).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::ProtocolViolation { violation: ProtocolViolation::CommandWhileGenerating, .. }
        ));
        assert!(!err.is_fatal());
        assert_eq!(b.held_commands(), 0);
    }

    #[test]
    fn test_follower_ready_interleaved_with_instructions() {
        let mut transport = ScriptedTransport::new(C);
        let mut c = Handshake::new(C, roster(&[A, B, C]), GenerationRole::Follower { author: A });

        // B finished before C saw most of the stream
        c.handle(A, Message::Instruction(place(1)), &mut transport).unwrap();
        c.handle(B, Message::PlayerReady, &mut transport).unwrap();
        c.handle(A, Message::Instruction(place(2)), &mut transport).unwrap();
        assert_eq!(c.state(), HandshakeState::Generating);
        assert!(transport.sent().is_empty());

        c.handle(A, Message::FinishGenerating, &mut transport).unwrap();
        assert_eq!(c.pending_ready(), roster(&[A]));
        assert_eq!(transport.sent(), vec![Message::PlayerReady]);

        c.handle(A, Message::PlayerReady, &mut transport).unwrap();
        assert!(c.is_ready());
        assert_eq!(c.take_world().map(|w| w.bodies.len()), Some(2));
        assert_eq!(transport.sent().len(), 1);
    }
}
