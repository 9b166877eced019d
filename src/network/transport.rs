//! Transport Channel
//!
//! Ordered byte-message links between peers. The handshake and dispatcher
//! only see the `Transport` trait; `LocalTransport` is the in-process
//! implementation built on tokio unbounded channels, used by the demo and
//! the tests. Each endpoint's receive queue can be filled from any task and
//! is drained by the session pump on the game-loop thread.

use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, warn};

use crate::game::world::ParticipantId;

/// Delivery guarantee requested for a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Delivered exactly once, in send order per sender
    ReliableOrdered,
    /// May be dropped; never used by the handshake or commands
    Unreliable,
}

/// Something that happened on the link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived
    Message {
        /// Sender as identified by the link (not by the payload)
        from: ParticipantId,
        /// Raw frame
        bytes: Vec<u8>,
    },
    /// A peer went away
    Disconnected(ParticipantId),
}

/// Link failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The local endpoint left the mesh.
    #[error("transport closed")]
    Closed,
}

/// Byte-message link from one participant to all others.
pub trait Transport {
    /// Participant this endpoint belongs to.
    fn local_id(&self) -> ParticipantId;

    /// Broadcast a frame to every connected peer.
    ///
    /// Fire-and-forget: peers that turn out to be gone show up later as
    /// `TransportEvent::Disconnected` from `poll`.
    fn send(&mut self, bytes: &[u8], mode: DeliveryMode) -> Result<(), TransportError>;

    /// Take the next received event, if any. Never blocks.
    fn poll(&mut self) -> Option<TransportEvent>;
}

// =============================================================================
// IN-PROCESS TRANSPORT
// =============================================================================

#[derive(Debug)]
enum Envelope {
    Frame { from: ParticipantId, bytes: Vec<u8> },
    Closed(ParticipantId),
}

/// One endpoint of an in-process mesh.
#[derive(Debug)]
pub struct LocalTransport {
    id: ParticipantId,
    peers: BTreeMap<ParticipantId, UnboundedSender<Envelope>>,
    inbox: UnboundedReceiver<Envelope>,
    pending: VecDeque<TransportEvent>,
    closed: bool,
}

/// Builder for fully connected in-process meshes.
pub struct LocalNetwork;

impl LocalNetwork {
    /// Create one connected endpoint per participant, in the given order.
    pub fn mesh(ids: &[ParticipantId]) -> Vec<LocalTransport> {
        let channels: Vec<_> = ids.iter().map(|_| mpsc::unbounded_channel()).collect();
        let senders: Vec<UnboundedSender<Envelope>> = channels.iter().map(|(tx, _)| tx.clone()).collect();

        ids.iter()
            .zip(channels)
            .map(|(&id, (_, inbox))| {
                let peers = ids.iter()
                    .zip(&senders)
                    .filter(|(peer, _)| **peer != id)
                    .map(|(&peer, tx)| (peer, tx.clone()))
                    .collect();
                LocalTransport {
                    id,
                    peers,
                    inbox,
                    pending: VecDeque::new(),
                    closed: false,
                }
            })
            .collect()
    }
}

impl LocalTransport {
    /// Peers this endpoint still considers connected.
    pub fn connected_peers(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.peers.keys().copied()
    }

    /// Leave the mesh. Every peer sees `Disconnected(self)`.
    pub fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        for tx in self.peers.values() {
            let _ = tx.send(Envelope::Closed(self.id));
        }
        self.peers.clear();
        self.closed = true;
        debug!(participant = %self.id, "Left mesh");
    }
}

impl Transport for LocalTransport {
    fn local_id(&self) -> ParticipantId {
        self.id
    }

    fn send(&mut self, bytes: &[u8], mode: DeliveryMode) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if mode == DeliveryMode::Unreliable {
            // In-process delivery never drops; the mode only matters to
            // real network links.
            debug!(participant = %self.id, len = bytes.len(), "Unreliable send over local mesh");
        }

        let mut gone = Vec::new();
        for (&peer, tx) in &self.peers {
            if tx.send(Envelope::Frame { from: self.id, bytes: bytes.to_vec() }).is_err() {
                gone.push(peer);
            }
        }
        for peer in gone {
            warn!(participant = %self.id, peer = %peer, "Peer endpoint dropped");
            self.peers.remove(&peer);
            self.pending.push_back(TransportEvent::Disconnected(peer));
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.inbox.try_recv() {
            Ok(Envelope::Frame { from, bytes }) => Some(TransportEvent::Message { from, bytes }),
            Ok(Envelope::Closed(peer)) => {
                self.peers.remove(&peer);
                Some(TransportEvent::Disconnected(peer))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// =============================================================================
// SCRIPTED TRANSPORT (tests)
// =============================================================================

/// Endpoint whose inbox is filled frame by frame by the test, so senders can
/// be interleaved in any order that keeps each sender's own order.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;

    use super::{DeliveryMode, Transport, TransportError, TransportEvent};
    use crate::game::world::ParticipantId;
    use crate::network::protocol::{decode, encode, Message};

    #[derive(Debug)]
    pub(crate) struct ScriptedTransport {
        id: ParticipantId,
        inbox: VecDeque<TransportEvent>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(id: ParticipantId) -> Self {
            Self {
                id,
                inbox: VecDeque::new(),
                sent: Vec::new(),
            }
        }

        /// Queue `message` as if `from` had sent it.
        pub(crate) fn deliver(&mut self, from: ParticipantId, message: impl Into<Message>) -> &mut Self {
            let bytes = encode(&message.into()).expect("test message encodes");
            self.inbox.push_back(TransportEvent::Message { from, bytes });
            self
        }

        /// Everything this endpoint broadcast, decoded.
        pub(crate) fn sent(&self) -> Vec<Message> {
            self.sent.iter().map(|bytes| decode(bytes).expect("sent frame decodes")).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn local_id(&self) -> ParticipantId {
            self.id
        }

        fn send(&mut self, bytes: &[u8], _mode: DeliveryMode) -> Result<(), TransportError> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn poll(&mut self) -> Option<TransportEvent> {
            self.inbox.pop_front()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const A: ParticipantId = ParticipantId(0);
    const B: ParticipantId = ParticipantId(1);
    const C: ParticipantId = ParticipantId(2);

    fn three() -> (LocalTransport, LocalTransport, LocalTransport) {
        let mut mesh = LocalNetwork::mesh(&[A, B, C]);
        let c = mesh.pop().unwrap();
        let b = mesh.pop().unwrap();
        let a = mesh.pop().unwrap();
        (a, b, c)
    }

    #[test]
    fn test_broadcast_reaches_every_peer_in_order() {
        let (mut a, mut b, mut c) = three();
        a.send(&[1], DeliveryMode::ReliableOrdered).unwrap();
        a.send(&[2], DeliveryMode::ReliableOrdered).unwrap();

        for endpoint in [&mut b, &mut c] {
            assert_eq!(endpoint.poll(), Some(TransportEvent::Message { from: A, bytes: vec![1] }));
            assert_eq!(endpoint.poll(), Some(TransportEvent::Message { from: A, bytes: vec![2] }));
            assert_eq!(endpoint.poll(), None);
        }
        // No echo to self
        assert_eq!(a.poll(), None);
    }

    #[test]
    fn test_drop_notifies_peers() {
        let (a, mut b, mut c) = three();
        drop(a);

        assert_eq!(b.poll(), Some(TransportEvent::Disconnected(A)));
        assert_eq!(c.poll(), Some(TransportEvent::Disconnected(A)));
        assert_eq!(b.connected_peers().collect::<Vec<_>>(), vec![C]);
    }

    #[test]
    fn test_send_after_disconnect_fails() {
        let (mut a, _b, _c) = three();
        a.disconnect();
        assert_eq!(a.send(&[0], DeliveryMode::ReliableOrdered), Err(TransportError::Closed));
    }

    #[test]
    fn test_local_id() {
        let (a, b, _c) = three();
        assert_eq!(a.local_id(), A);
        assert_eq!(b.local_id(), B);
    }
}
