//! Protocol states and per-session bookkeeping.

use crate::core::{ArqConfig, NodeId};

/// State of the ARQ machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Nothing outstanding; ready to originate or receive.
    #[default]
    Idle,
    /// A PDU was handed to the link; waiting for transmission to complete.
    Tx,
    /// A data PDU is on the wire; waiting for its ack or a timeout.
    WaitAck,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The encoded data PDU awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    /// Sequence number carried by the PDU.
    pub seq: u8,
    /// Encoded PDU, resent verbatim on timeout.
    pub bytes: Vec<u8>,
}

impl PendingFrame {
    /// Length of the encoded PDU.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the encoded PDU is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Session state for the single node-to-peer conversation.
///
/// Mutated only by [`crate::fsm::ArqMachine`]; producers never touch it.
#[derive(Debug, Clone)]
pub struct Session {
    local_id: NodeId,
    peer_id: NodeId,
    seq_modulus: u16,
    pub(crate) state: State,
    pub(crate) tx_seq: u8,
    pub(crate) retx_count: u8,
    pub(crate) pending_frame: Option<PendingFrame>,
    /// Last data PDU acknowledged, for duplicate detection.
    pub(crate) last_received: Option<(NodeId, u8)>,
}

impl Session {
    /// Create a session in `Idle` with `tx_seq = 0`.
    pub fn new(config: &ArqConfig) -> Self {
        Self {
            local_id: config.local_id,
            peer_id: config.peer_id,
            seq_modulus: config.seq_modulus,
            state: State::Idle,
            tx_seq: 0,
            retx_count: 0,
            pending_frame: None,
            last_received: None,
        }
    }

    /// Address of this node.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Address of the peer.
    pub fn peer_id(&self) -> NodeId {
        self.peer_id
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Sequence number the next new data PDU will carry.
    pub fn tx_seq(&self) -> u8 {
        self.tx_seq
    }

    /// Retransmissions spent on the outstanding frame.
    pub fn retx_count(&self) -> u8 {
        self.retx_count
    }

    /// The outstanding data PDU, if any.
    pub fn pending_frame(&self) -> Option<&PendingFrame> {
        self.pending_frame.as_ref()
    }

    /// Advance `tx_seq` modulo `N`.
    pub(crate) fn advance_seq(&mut self) {
        self.tx_seq = ((u16::from(self.tx_seq) + 1) % self.seq_modulus) as u8;
    }

    /// Record an acknowledged data PDU.
    ///
    /// Returns `true` if it repeats the previous one from the same source.
    pub(crate) fn record_received(&mut self, src: NodeId, seq: u8) -> bool {
        let duplicate = self.last_received == Some((src, seq));
        self.last_received = Some((src, seq));
        duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(modulus: u16) -> Session {
        let config = ArqConfig::builder(NodeId(1), NodeId(2))
            .seq_modulus(modulus)
            .build()
            .unwrap();
        Session::new(&config)
    }

    #[test]
    fn test_new_session() {
        let session = session(256);
        assert_eq!(session.state(), State::Idle);
        assert_eq!(session.tx_seq(), 0);
        assert_eq!(session.retx_count(), 0);
        assert!(session.pending_frame().is_none());
        assert_eq!(session.local_id(), NodeId(1));
        assert_eq!(session.peer_id(), NodeId(2));
    }

    #[test]
    fn test_seq_wraps_at_modulus() {
        let mut session = session(4);
        let seen: Vec<u8> = (0..9)
            .map(|_| {
                let seq = session.tx_seq();
                session.advance_seq();
                seq
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_seq_wraps_at_full_byte() {
        let mut session = session(256);
        session.tx_seq = 255;
        session.advance_seq();
        assert_eq!(session.tx_seq(), 0);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut session = session(256);
        assert!(!session.record_received(NodeId(2), 5));
        assert!(session.record_received(NodeId(2), 5));
        assert!(!session.record_received(NodeId(3), 5));
        assert!(!session.record_received(NodeId(3), 6));
    }
}
