//! Session Pump
//!
//! Owns the handshake, the running world, the dispatcher and the transport
//! for one participant. The game loop calls `pump` once per tick to drain
//! everything the transport received, then `try_do` for local commands.
//! `pump` takes `&mut self`, so the session is the single writer of the
//! world by construction.
//!
//! Every incident is reported on the notification channel returned from
//! `Session::new`. The session never ends the process: fatal problems move
//! it to `SessionPhase::Aborted` and the application decides what to do.

use std::collections::{BTreeSet, VecDeque};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, instrument, warn};

use crate::core::hash::StateHash;
use crate::game::builder::BuildError;
use crate::game::command::{CommandAction, CommandRejection, CommandRequest};
use crate::game::instruction::GenerationInstruction;
use crate::game::world::{ParticipantId, World};
use crate::network::dispatcher::{CommandDispatcher, DispatchError, DispatchStats};
use crate::network::handshake::{GenerationRole, Handshake, HandshakeError, HandshakeState};
use crate::network::protocol::{decode, DecodeError, Message, ProtocolViolation};
use crate::network::transport::{Transport, TransportError, TransportEvent};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for one participant's session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session identifier, agreed out of band (seeds world generation).
    pub session_id: u64,
    /// This participant.
    pub local_id: ParticipantId,
    /// Closed roster, including `local_id`.
    pub participants: BTreeSet<ParticipantId>,
    /// Author or follower.
    pub role: GenerationRole,
    /// Undecodable frames tolerated before the session aborts.
    pub max_decode_errors: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: 0,
            local_id: ParticipantId(0),
            participants: [ParticipantId(0)].into_iter().collect(),
            role: GenerationRole::Author { instructions: Vec::new() },
            max_decode_errors: 16,
        }
    }
}

impl SessionConfig {
    /// Config for the generation author.
    pub fn author(
        session_id: u64,
        local_id: ParticipantId,
        participants: BTreeSet<ParticipantId>,
        instructions: Vec<GenerationInstruction>,
    ) -> Self {
        Self {
            session_id,
            local_id,
            participants,
            role: GenerationRole::Author { instructions },
            ..Default::default()
        }
    }

    /// Config for a follower of `author`.
    pub fn follower(
        session_id: u64,
        local_id: ParticipantId,
        participants: BTreeSet<ParticipantId>,
        author: ParticipantId,
    ) -> Self {
        Self {
            session_id,
            local_id,
            participants,
            role: GenerationRole::Follower { author },
            ..Default::default()
        }
    }
}

// =============================================================================
// PHASES AND EVENTS
// =============================================================================

/// Why a session stopped for good.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    /// A peer left before Running.
    #[error("{0} disconnected before the world was running")]
    PeerDisconnected(ParticipantId),
    /// The local World Builder rejected an instruction.
    #[error("local world generation failed at instruction #{index}: {source}")]
    GenerationDesync {
        /// Position in the instruction stream
        index: usize,
        /// Builder verdict
        #[source]
        source: BuildError,
    },
    /// A peer announced its generation failed.
    #[error("{0} failed to generate its world")]
    PeerGenerationFailed(ParticipantId),
    /// Too many undecodable frames.
    #[error("{count} undecodable frames received")]
    TooManyDecodeErrors {
        /// Frames dropped so far
        count: u32,
    },
    /// A handshake message could not be encoded.
    #[error("message encoding failed: {0}")]
    Encode(String),
    /// The transport failed during the handshake.
    #[error("transport failed: {0}")]
    Transport(#[source] TransportError),
}

/// Session failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session is in the Aborted phase.
    #[error("session aborted: {0}")]
    Aborted(AbortReason),
}

/// Notifications for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Every participant is ready; the world is live
    EnteredRunning {
        /// Digest of the freshly built world
        world_hash: StateHash,
    },
    /// A well-formed message arrived at the wrong time or from the wrong peer
    ProtocolViolation {
        /// Sender
        from: ParticipantId,
        /// What was wrong
        violation: ProtocolViolation,
    },
    /// A frame could not be decoded
    DecodeFailed {
        /// Sender
        from: ParticipantId,
        /// Decoder message
        reason: String,
    },
    /// A remote command failed validation here
    Desync {
        /// Origin of the command
        from: ParticipantId,
        /// Why it failed locally
        rejection: CommandRejection,
    },
    /// A peer left while running; play continues without it
    ParticipantDropped(ParticipantId),
    /// A local command was applied but could not be sent
    TransportFailure(TransportError),
    /// The session stopped
    Aborted(AbortReason),
}

/// Live state once the handshake finished.
#[derive(Debug)]
pub struct RunningState {
    /// The shared world
    pub world: World,
    /// Command routing
    pub dispatcher: CommandDispatcher,
    /// Peers still connected (plus the local participant)
    pub connected: BTreeSet<ParticipantId>,
}

/// Where the session is.
#[derive(Debug)]
pub enum SessionPhase {
    /// Building the world
    Handshaking(Handshake),
    /// Simulating
    Running(RunningState),
    /// Stopped for good
    Aborted(AbortReason),
}

/// What routing a decoded message produced.
enum Routed {
    Handshake(Result<(), HandshakeError>),
    Event(SessionEvent),
    Nothing,
}

// =============================================================================
// SESSION
// =============================================================================

/// One participant's end of a lockstep session.
pub struct Session<T: Transport> {
    session_id: u64,
    local_id: ParticipantId,
    max_decode_errors: u32,
    phase: SessionPhase,
    transport: T,
    events: UnboundedSender<SessionEvent>,
    decode_errors: u32,
    tick: u32,
}

impl<T: Transport> Session<T> {
    /// Create a session and the receiver for its notifications.
    pub fn new(config: SessionConfig, transport: T) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let handshake = Handshake::new(config.local_id, config.participants, config.role);
        let session = Self {
            session_id: config.session_id,
            local_id: config.local_id,
            max_decode_errors: config.max_decode_errors,
            phase: SessionPhase::Handshaking(handshake),
            transport,
            events,
            decode_errors: 0,
            tick: 0,
        };
        (session, rx)
    }

    /// Start the handshake. Authors send their whole instruction stream here.
    pub fn start(&mut self) -> Result<(), SessionError> {
        info!(session = self.session_id, participant = %self.local_id, "Starting session");
        let result = match &mut self.phase {
            SessionPhase::Handshaking(handshake) => handshake.start(&mut self.transport),
            _ => Ok(()),
        };
        self.after_handshake(result);

        match &self.phase {
            SessionPhase::Aborted(reason) => Err(SessionError::Aborted(reason.clone())),
            _ => Ok(()),
        }
    }

    /// Drain the transport and route everything received. Call once per tick.
    ///
    /// Returns the number of transport events processed.
    #[instrument(skip(self), fields(participant = %self.local_id, tick = self.tick))]
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while !self.is_aborted() {
            let Some(event) = self.transport.poll() else {
                break;
            };
            processed += 1;
            match event {
                TransportEvent::Message { from, bytes } => self.on_frame(from, &bytes),
                TransportEvent::Disconnected(peer) => self.on_disconnect(peer),
            }
        }
        self.tick = self.tick.wrapping_add(1);
        processed
    }

    /// Submit a local command. True if it was applied (and broadcast).
    pub fn try_do(&mut self, request: &CommandRequest) -> bool {
        let SessionPhase::Running(running) = &mut self.phase else {
            debug!(participant = %self.local_id, command = request.name(), "Command before running, ignored");
            return false;
        };
        let result = running.dispatcher.try_do(&mut running.world, request, &mut self.transport);
        match result {
            Ok(_) => true,
            Err(DispatchError::Transport(e)) => {
                self.emit(SessionEvent::TransportFailure(e));
                true
            }
            Err(_) => false,
        }
    }

    /// Submit an action as the local participant at the current tick.
    pub fn submit(&mut self, action: CommandAction) -> bool {
        let request = CommandRequest {
            origin: self.local_id,
            submitted_at: self.tick,
            action,
        };
        self.try_do(&request)
    }

    /// Register the callback run once when the world becomes live.
    ///
    /// Runs immediately if the session is already running; never runs if it
    /// aborted.
    pub fn on_enter_running<F>(&mut self, callback: F)
    where
        F: FnOnce(&World) + Send + 'static,
    {
        match &mut self.phase {
            SessionPhase::Handshaking(handshake) => handshake.on_enter_running(callback),
            SessionPhase::Running(running) => callback(&running.world),
            SessionPhase::Aborted(_) => {}
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// This participant.
    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    /// Session identifier.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Ticks pumped so far; used as `submitted_at` by `submit`.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Current phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Handshake state, `Running` once the world is live, `None` if aborted.
    pub fn handshake_state(&self) -> Option<HandshakeState> {
        match &self.phase {
            SessionPhase::Handshaking(handshake) => Some(handshake.state()),
            SessionPhase::Running(_) => Some(HandshakeState::Running),
            SessionPhase::Aborted(_) => None,
        }
    }

    /// Is the world live?
    pub fn is_running(&self) -> bool {
        matches!(self.phase, SessionPhase::Running(_))
    }

    /// Has the session stopped?
    pub fn is_aborted(&self) -> bool {
        matches!(self.phase, SessionPhase::Aborted(_))
    }

    /// Why the session stopped, if it did.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.phase {
            SessionPhase::Aborted(reason) => Some(reason),
            _ => None,
        }
    }

    /// The live world.
    pub fn world(&self) -> Option<&World> {
        match &self.phase {
            SessionPhase::Running(running) => Some(&running.world),
            _ => None,
        }
    }

    /// Dispatcher counters, once running.
    pub fn dispatch_stats(&self) -> Option<DispatchStats> {
        match &self.phase {
            SessionPhase::Running(running) => Some(running.dispatcher.stats()),
            _ => None,
        }
    }

    /// Undecodable frames seen so far.
    pub fn decode_errors(&self) -> u32 {
        self.decode_errors
    }

    /// The underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // -------------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------------

    fn on_frame(&mut self, from: ParticipantId, bytes: &[u8]) {
        let message = match decode(bytes) {
            Ok(message) => message,
            Err(e) => return self.on_decode_error(from, e),
        };

        let routed = match &mut self.phase {
            SessionPhase::Handshaking(handshake) => {
                Routed::Handshake(handshake.handle(from, message, &mut self.transport))
            }
            SessionPhase::Running(running) => route_running(running, from, message),
            SessionPhase::Aborted(_) => Routed::Nothing,
        };

        match routed {
            Routed::Handshake(result) => self.after_handshake(result),
            Routed::Event(event) => self.emit(event),
            Routed::Nothing => {}
        }
    }

    fn on_decode_error(&mut self, from: ParticipantId, error: DecodeError) {
        self.decode_errors += 1;
        self.emit(SessionEvent::DecodeFailed { from, reason: error.to_string() });
        if self.decode_errors > self.max_decode_errors {
            self.abort(AbortReason::TooManyDecodeErrors { count: self.decode_errors });
        }
    }

    fn on_disconnect(&mut self, peer: ParticipantId) {
        let dropped = match &mut self.phase {
            SessionPhase::Handshaking(_) => {
                self.abort(AbortReason::PeerDisconnected(peer));
                return;
            }
            SessionPhase::Running(running) => running.connected.remove(&peer),
            SessionPhase::Aborted(_) => false,
        };
        if dropped {
            self.emit(SessionEvent::ParticipantDropped(peer));
        }
    }

    fn after_handshake(&mut self, result: Result<(), HandshakeError>) {
        if let Err(e) = result {
            match e {
                HandshakeError::ProtocolViolation { from, violation } => {
                    self.emit(SessionEvent::ProtocolViolation { from, violation });
                }
                HandshakeError::Decode { from, source } => self.on_decode_error(from, source),
                HandshakeError::Generation { index, source } => {
                    self.abort(AbortReason::GenerationDesync { index, source });
                }
                HandshakeError::PeerAborted(peer) => self.abort(AbortReason::PeerGenerationFailed(peer)),
                HandshakeError::Encode(e) => self.abort(AbortReason::Encode(e.to_string())),
                HandshakeError::Transport(e) => self.abort(AbortReason::Transport(e)),
            }
            return;
        }

        let live = match &mut self.phase {
            SessionPhase::Handshaking(handshake) if handshake.is_ready() => handshake
                .take_world()
                .map(|world| (world, handshake.take_held_commands())),
            _ => None,
        };
        let Some((world, held)) = live else {
            return;
        };

        let world_hash = world.compute_hash();
        let connected = world.participants.clone();
        self.phase = SessionPhase::Running(RunningState {
            world,
            dispatcher: CommandDispatcher::new(self.local_id),
            connected,
        });
        self.emit(SessionEvent::EnteredRunning { world_hash });
        self.replay_held(held);
    }

    /// Apply commands that peers sent while this peer was still waiting for
    /// readiness signals, in the order they arrived.
    fn replay_held(&mut self, held: VecDeque<(ParticipantId, CommandRequest)>) {
        if held.is_empty() {
            return;
        }
        debug!(participant = %self.local_id, count = held.len(), "Replaying commands received before running");
        for (from, request) in held {
            let routed = match &mut self.phase {
                SessionPhase::Running(running) => dispatch_remote(running, from, &request),
                _ => return,
            };
            if let Routed::Event(event) = routed {
                self.emit(event);
            }
        }
    }

    fn abort(&mut self, reason: AbortReason) {
        self.phase = SessionPhase::Aborted(reason.clone());
        self.emit(SessionEvent::Aborted(reason));
    }

    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::EnteredRunning { world_hash } => {
                info!(participant = %self.local_id, world_hash = %hex::encode(&world_hash[..8]), "Session running");
            }
            SessionEvent::ProtocolViolation { from, violation } => {
                warn!(participant = %self.local_id, from = %from, %violation, "Protocol violation, message dropped");
            }
            SessionEvent::DecodeFailed { from, reason } => {
                warn!(
                    participant = %self.local_id,
                    from = %from,
                    errors = self.decode_errors,
                    %reason,
                    "Undecodable frame dropped"
                );
            }
            SessionEvent::Desync { from, rejection } => {
                warn!(participant = %self.local_id, from = %from, %rejection, "Desync: remote command failed validation");
            }
            SessionEvent::ParticipantDropped(peer) => {
                warn!(participant = %self.local_id, peer = %peer, "Participant dropped, continuing");
            }
            SessionEvent::TransportFailure(e) => {
                error!(participant = %self.local_id, error = %e, "Command applied locally but not sent");
            }
            SessionEvent::Aborted(reason) => {
                error!(participant = %self.local_id, %reason, "Session aborted");
            }
        }
        // The application may have dropped the receiver; events are advisory.
        let _ = self.events.send(event);
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("local_id", &self.local_id)
            .field("phase", &self.phase)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

fn route_running(running: &mut RunningState, from: ParticipantId, message: Message) -> Routed {
    let violation = |violation: ProtocolViolation| Routed::Event(SessionEvent::ProtocolViolation { from, violation });

    if !running.world.is_participant(from) {
        return violation(ProtocolViolation::UnknownParticipant);
    }

    match message {
        Message::Command(request) => dispatch_remote(running, from, &request),
        Message::PlayerReady => violation(ProtocolViolation::DuplicateReady),
        other => violation(ProtocolViolation::GenerationMessageAfterFinish { kind: other.kind() }),
    }
}

fn dispatch_remote(running: &mut RunningState, from: ParticipantId, request: &CommandRequest) -> Routed {
    match running.dispatcher.handle_remote(&mut running.world, from, request) {
        Ok(_) => Routed::Nothing,
        Err(DispatchError::ValidationMismatch { from, rejection }) => {
            Routed::Event(SessionEvent::Desync { from, rejection })
        }
        Err(DispatchError::ProtocolViolation { from, violation }) => {
            Routed::Event(SessionEvent::ProtocolViolation { from, violation })
        }
        Err(other) => {
            warn!(from = %from, error = %other, "Remote command dropped");
            Routed::Nothing
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
