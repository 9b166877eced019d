//! Network Layer
//!
//! Everything between the transport and the world: framing, the generation
//! handshake, command dispatch and the per-tick session pump. Reception is
//! asynchronous; application of what was received happens only inside
//! `Session::pump`, on the game-loop thread.
//!
//! ## Module Structure
//!
//! - `transport`: Byte-message links (`Transport` trait, in-process mesh)
//! - `protocol`: Frame codec and protocol violations
//! - `handshake`: Generating → AwaitingPeerReady → Running
//! - `dispatcher`: Validate-then-apply for synced commands
//! - `session`: Owns all of the above for one participant

pub mod transport;
pub mod protocol;
pub mod handshake;
pub mod dispatcher;
pub mod session;

pub use transport::{DeliveryMode, LocalNetwork, LocalTransport, Transport, TransportError, TransportEvent};
pub use protocol::{decode, decode_payload, encode, DecodeError, EncodeError, Message, MessageKind, ProtocolViolation};
pub use handshake::{GenerationRole, Handshake, HandshakeError, HandshakeState};
pub use dispatcher::{CommandDispatcher, DispatchError, DispatchStats};
pub use session::{AbortReason, RunningState, Session, SessionConfig, SessionError, SessionEvent, SessionPhase};
