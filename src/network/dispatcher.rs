//! Synced Command Dispatcher
//!
//! Validate-then-apply for commands once the world is running. Local
//! requests are applied immediately and broadcast exactly once; remote
//! requests are re-validated against the local world before being applied.
//! A remote request that fails here passed validation on its origin, so the
//! two worlds have diverged: that is reported as a desync, never applied.

use tracing::{debug, warn};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::game::command::{CommandEffect, CommandRejection, CommandRequest};
use crate::game::world::{ParticipantId, World};
use crate::network::protocol::{encode, EncodeError, Message, ProtocolViolation};
use crate::network::transport::{DeliveryMode, Transport, TransportError};

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Local requests applied and broadcast
    pub local_applied: u64,
    /// Local requests that failed validation
    pub local_rejected: u64,
    /// Remote requests applied
    pub remote_applied: u64,
    /// Remote requests that failed validation here
    pub desyncs: u64,
}

/// Dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Local request failed validation.
    #[error("local request rejected: {0}")]
    Rejected(#[source] CommandRejection),
    /// Remote request failed validation here.
    #[error("remote request from {from} failed validation here: {rejection}")]
    ValidationMismatch {
        /// Sender
        from: ParticipantId,
        /// Why the local predicate said no
        rejection: CommandRejection,
    },
    /// Request with a bad origin.
    #[error("protocol violation from {from}: {violation}")]
    ProtocolViolation {
        /// Sender
        from: ParticipantId,
        /// What was wrong with the origin
        violation: ProtocolViolation,
    },
    /// Request could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Request applied but could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Routes command requests between the local world and the peers.
#[derive(Debug)]
pub struct CommandDispatcher {
    local_id: ParticipantId,
    stats: DispatchStats,
}

impl CommandDispatcher {
    /// Create a dispatcher for the local participant.
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            stats: DispatchStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Submit a local request.
    ///
    /// On success the request has been applied to `world` and broadcast
    /// reliable-ordered. A rejected request is neither applied nor sent.
    /// A `Transport` error means the request was applied locally but the
    /// link is gone.
    pub fn try_do<T: Transport + ?Sized>(
        &mut self,
        world: &mut World,
        request: &CommandRequest,
        transport: &mut T,
    ) -> Result<CommandEffect, DispatchError> {
        if request.origin != self.local_id {
            self.stats.local_rejected += 1;
            return Err(DispatchError::ProtocolViolation {
                from: self.local_id,
                violation: ProtocolViolation::OriginMismatch { claimed: request.origin },
            });
        }
        if let Err(rejection) = request.validate(world) {
            self.stats.local_rejected += 1;
            debug!(participant = %self.local_id, command = request.name(), reason = %rejection, "Local command rejected");
            return Err(DispatchError::Rejected(rejection));
        }

        // Encode before touching the world so an encode failure applies nothing
        let frame = encode(&Message::Command(*request))?;
        let effect = request.apply(world).map_err(DispatchError::Rejected)?;
        self.stats.local_applied += 1;

        #[cfg(feature = "debug-tracing")]
        trace!(participant = %self.local_id, command = request.name(), ?effect, "Local command applied");

        transport.send(&frame, DeliveryMode::ReliableOrdered)?;
        Ok(effect)
    }

    /// Handle a request received from peer `from`.
    pub fn handle_remote(
        &mut self,
        world: &mut World,
        from: ParticipantId,
        request: &CommandRequest,
    ) -> Result<CommandEffect, DispatchError> {
        if request.origin == self.local_id {
            return Err(DispatchError::ProtocolViolation {
                from,
                violation: ProtocolViolation::EchoedLocalCommand,
            });
        }
        if request.origin != from {
            return Err(DispatchError::ProtocolViolation {
                from,
                violation: ProtocolViolation::OriginMismatch { claimed: request.origin },
            });
        }

        match request.apply(world) {
            Ok(effect) => {
                self.stats.remote_applied += 1;
                #[cfg(feature = "debug-tracing")]
                trace!(participant = %self.local_id, from = %from, command = request.name(), ?effect, "Remote command applied");
                Ok(effect)
            }
            Err(rejection) => {
                self.stats.desyncs += 1;
                warn!(
                    participant = %self.local_id,
                    from = %from,
                    command = request.name(),
                    submitted_at = request.submitted_at,
                    reason = %rejection,
                    "Remote command failed validation, worlds have diverged"
                );
                Err(DispatchError::ValidationMismatch { from, rejection })
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::core::fixed::{to_fixed, Fixed, FIXED_ONE};
    use crate::core::vec2::FixedVec2;
    use crate::game::builder::WorldBuilder;
    use crate::game::instruction::{AssignEconomy, PlaceBody};
    use crate::game::world::{BodyId, EcoStats, ProjectileId};
    use crate::network::protocol::decode;
    use crate::network::transport::{LocalNetwork, TransportEvent};

    const A: ParticipantId = ParticipantId(0);
    const B: ParticipantId = ParticipantId(1);

    fn world(stock: Fixed) -> World {
        let roster: BTreeSet<_> = [A, B].into_iter().collect();
        let mut builder = WorldBuilder::new(roster);
        for (id, player) in [(1, A), (2, B)] {
            builder.apply(&PlaceBody {
                id: BodyId(id),
                position: FixedVec2::from_ints(id as i32 * 10, 0),
                velocity: FixedVec2::ZERO,
                radius: FIXED_ONE,
                mass: FIXED_ONE,
                max_health: to_fixed(100.0),
            }.into()).unwrap();
            builder.apply(&AssignEconomy {
                player,
                body: BodyId(id),
                starting: EcoStats { projectiles: stock, ..Default::default() },
            }.into()).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn test_valid_local_applied_and_broadcast_once() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let mut wa = world(to_fixed(2.0));
        let mut wb = wa.clone();
        let mut da = CommandDispatcher::new(A);
        let mut db = CommandDispatcher::new(B);

        let request = CommandRequest::fire(A, 3, BodyId(1), FixedVec2::UP);
        let effect = da.try_do(&mut wa, &request, &mut ta).unwrap();
        assert_eq!(effect, CommandEffect::ProjectileFired(ProjectileId { owner: A, seq: 0 }));
        assert_eq!(wa.projectiles.len(), 1);

        let Some(TransportEvent::Message { from, bytes }) = tb.poll() else {
            panic!("expected the command frame");
        };
        assert_eq!(tb.poll(), None);

        let Ok(Message::Command(received)) = decode(&bytes) else {
            panic!("expected a command");
        };
        assert_eq!(received, request);
        db.handle_remote(&mut wb, from, &received).unwrap();

        assert_eq!(wa, wb);
        assert_eq!(da.stats().local_applied, 1);
        assert_eq!(db.stats().remote_applied, 1);
    }

    #[test]
    fn test_zero_stock_never_applied_nor_broadcast() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let mut wa = world(0);
        let before = wa.clone();
        let mut da = CommandDispatcher::new(A);

        let request = CommandRequest::fire(A, 0, BodyId(1), FixedVec2::UP);
        let err = da.try_do(&mut wa, &request, &mut ta).unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(CommandRejection::NoProjectiles { .. })));
        assert_eq!(wa, before);
        assert_eq!(tb.poll(), None);
        assert_eq!(da.stats().local_rejected, 1);
    }

    #[test]
    fn test_local_request_for_someone_else_rejected() {
        let mut mesh = LocalNetwork::mesh(&[A, B]);
        let mut tb = mesh.pop().unwrap();
        let mut ta = mesh.pop().unwrap();

        let mut wa = world(to_fixed(2.0));
        let mut da = CommandDispatcher::new(A);
        let request = CommandRequest::fire(B, 0, BodyId(2), FixedVec2::UP);
        assert!(da.try_do(&mut wa, &request, &mut ta).is_err());
        assert!(wa.projectiles.is_empty());
        assert_eq!(tb.poll(), None);
    }

    #[test]
    fn test_remote_mismatch_is_desync() {
        let mut wb = world(0);
        let before = wb.clone();
        let mut db = CommandDispatcher::new(B);

        let request = CommandRequest::fire(A, 0, BodyId(1), FixedVec2::UP);
        let err = db.handle_remote(&mut wb, A, &request).unwrap_err();
        assert!(matches!(err, DispatchError::ValidationMismatch { from: A, .. }));
        assert_eq!(wb, before);
        assert_eq!(db.stats().desyncs, 1);
    }

    #[test]
    fn test_remote_origin_checks() {
        let mut wb = world(to_fixed(2.0));
        let mut db = CommandDispatcher::new(B);

        let spoofed = CommandRequest::fire(A, 0, BodyId(1), FixedVec2::UP);
        let err = db.handle_remote(&mut wb, ParticipantId(5), &spoofed).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ProtocolViolation { violation: ProtocolViolation::OriginMismatch { .. }, .. }
        ));

        let echoed = CommandRequest::fire(B, 0, BodyId(2), FixedVec2::UP);
        let err = db.handle_remote(&mut wb, B, &echoed).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ProtocolViolation { violation: ProtocolViolation::EchoedLocalCommand, .. }
        ));
        assert!(wb.projectiles.is_empty());
    }
}
