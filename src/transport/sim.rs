//! In-process simulated medium for deterministic testing.
//!
//! Real links drop frames. To exercise retransmission without depending on
//! actual network conditions, [`SimMedium`] connects any number of nodes in
//! memory and applies a [`DropPolicy`] to every PDU:
//!
//! | Fault          | Description                                   |
//! |----------------|-----------------------------------------------|
//! | Data loss      | Drop the next `n` data PDUs.                  |
//! | Ack loss       | Drop the next `n` ack PDUs.                   |
//! | Blackout       | Drop everything until lifted.                 |
//!
//! Delivery and transmit completion happen synchronously inside
//! [`LinkLayer::send`]; there is no propagation delay.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::inbox::Inbox;
use crate::core::{ArqResult, LinkLayer, NodeId, PduKind, ReceivedPdu};
use crate::fsm::{Event, EventRegistry};

/// Which PDUs the medium loses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropPolicy {
    /// Data PDUs still to drop.
    pub drop_data: usize,
    /// Ack PDUs still to drop.
    pub drop_acks: usize,
    /// Drop everything while set.
    pub blackout: bool,
}

impl DropPolicy {
    /// Decide the fate of one PDU, consuming a drop budget if used.
    fn should_drop(&mut self, kind: PduKind) -> bool {
        if self.blackout {
            return true;
        }
        let budget = match kind {
            PduKind::Data => &mut self.drop_data,
            PduKind::Ack => &mut self.drop_acks,
        };
        if *budget > 0 {
            *budget -= 1;
            return true;
        }
        false
    }
}

/// Counters kept by the medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Data PDUs handed to the medium.
    pub data_sent: usize,
    /// Ack PDUs handed to the medium.
    pub acks_sent: usize,
    /// PDUs lost to the drop policy or an absent destination.
    pub dropped: usize,
    /// PDUs stored in a destination inbox.
    pub delivered: usize,
}

#[derive(Debug, Clone)]
struct Port {
    registry: Arc<EventRegistry>,
    inbox: Arc<Inbox>,
}

#[derive(Debug, Default)]
struct MediumState {
    ports: HashMap<NodeId, Port>,
    policy: DropPolicy,
    stats: SimStats,
}

/// Shared in-memory medium.
#[derive(Debug, Default)]
pub struct SimMedium {
    state: Mutex<MediumState>,
}

impl SimMedium {
    /// Create an empty, lossless medium.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a node and return its link.
    pub fn attach(self: &Arc<Self>, id: NodeId, registry: Arc<EventRegistry>) -> SimLink {
        let inbox = Arc::new(Inbox::new());
        self.state.lock().ports.insert(
            id,
            Port {
                registry: Arc::clone(&registry),
                inbox: Arc::clone(&inbox),
            },
        );
        SimLink {
            local_id: id,
            medium: Arc::clone(self),
            registry,
            inbox,
        }
    }

    /// Drop the next `n` data PDUs.
    pub fn drop_next_data(&self, n: usize) {
        self.state.lock().policy.drop_data = n;
    }

    /// Drop the next `n` ack PDUs.
    pub fn drop_next_acks(&self, n: usize) {
        self.state.lock().policy.drop_acks = n;
    }

    /// Drop everything while `on` is set.
    pub fn set_blackout(&self, on: bool) {
        self.state.lock().policy.blackout = on;
    }

    /// Current drop policy.
    pub fn policy(&self) -> DropPolicy {
        self.state.lock().policy
    }

    /// Traffic counters.
    pub fn stats(&self) -> SimStats {
        self.state.lock().stats
    }

    fn transmit(&self, src: NodeId, dest: NodeId, pdu: &[u8], kind: PduKind) {
        let port = {
            let mut state = self.state.lock();
            match kind {
                PduKind::Data => state.stats.data_sent += 1,
                PduKind::Ack => state.stats.acks_sent += 1,
            }
            if state.policy.should_drop(kind) {
                trace!(%src, %dest, ?kind, "medium dropped PDU");
                state.stats.dropped += 1;
                return;
            }
            match state.ports.get(&dest) {
                Some(port) => port.clone(),
                None => {
                    trace!(%src, %dest, "no such node on the medium");
                    state.stats.dropped += 1;
                    return;
                }
            }
        };

        let delivered = port
            .inbox
            .deliver(&port.registry, kind, ReceivedPdu::new(src, pdu));
        let mut state = self.state.lock();
        if delivered {
            state.stats.delivered += 1;
        } else {
            state.stats.dropped += 1;
        }
    }
}

/// A node's attachment to a [`SimMedium`].
#[derive(Debug)]
pub struct SimLink {
    local_id: NodeId,
    medium: Arc<SimMedium>,
    registry: Arc<EventRegistry>,
    inbox: Arc<Inbox>,
}

impl SimLink {
    /// Address of this node.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// The medium this link is attached to.
    pub fn medium(&self) -> &Arc<SimMedium> {
        &self.medium
    }
}

impl LinkLayer for SimLink {
    fn send(&mut self, pdu: &[u8], dest: NodeId, kind: PduKind) -> ArqResult<()> {
        self.medium.transmit(self.local_id, dest, pdu, kind);
        self.registry.set(match kind {
            PduKind::Data => Event::DataTxDone,
            PduKind::Ack => Event::AckTxDone,
        });
        Ok(())
    }

    fn received_data(&self) -> Option<ReceivedPdu> {
        self.inbox.data()
    }

    fn received_ack(&self) -> Option<ReceivedPdu> {
        self.inbox.ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::frame;

    #[test]
    fn test_lossless_delivery() {
        let medium = SimMedium::new();
        let a_registry = Arc::new(EventRegistry::new());
        let b_registry = Arc::new(EventRegistry::new());
        let mut a = medium.attach(NodeId(1), a_registry.clone());
        let b = medium.attach(NodeId(2), b_registry.clone());

        a.send(&frame::encode_data(0, b"hi"), NodeId(2), PduKind::Data)
            .unwrap();

        assert!(a_registry.check(Event::DataTxDone));
        assert!(b_registry.check(Event::DataReceived));
        assert_eq!(b.received_data().unwrap().src, NodeId(1));
        assert_eq!(medium.stats().delivered, 1);
    }

    #[test]
    fn test_drop_budget() {
        let medium = SimMedium::new();
        let a_registry = Arc::new(EventRegistry::new());
        let b_registry = Arc::new(EventRegistry::new());
        let mut a = medium.attach(NodeId(1), a_registry.clone());
        let _b = medium.attach(NodeId(2), b_registry.clone());
        medium.drop_next_data(2);

        for _ in 0..2 {
            a.send(&frame::encode_data(0, b"x"), NodeId(2), PduKind::Data)
                .unwrap();
            assert!(a_registry.clear(Event::DataTxDone));
            assert!(!b_registry.check(Event::DataReceived));
        }
        a.send(&frame::encode_ack(0), NodeId(2), PduKind::Ack).unwrap();
        assert!(b_registry.check(Event::AckReceived));

        a.send(&frame::encode_data(0, b"x"), NodeId(2), PduKind::Data)
            .unwrap();
        assert!(b_registry.check(Event::DataReceived));
        assert_eq!(
            medium.stats(),
            SimStats {
                data_sent: 3,
                acks_sent: 1,
                dropped: 2,
                delivered: 2
            }
        );
    }

    #[test]
    fn test_blackout_and_absent_node() {
        let medium = SimMedium::new();
        let registry = Arc::new(EventRegistry::new());
        let mut a = medium.attach(NodeId(1), registry.clone());

        a.send(&frame::encode_ack(0), NodeId(5), PduKind::Ack).unwrap();
        medium.set_blackout(true);
        a.send(&frame::encode_ack(0), NodeId(1), PduKind::Ack).unwrap();

        assert!(registry.check(Event::AckTxDone));
        assert!(!registry.check(Event::AckReceived));
        assert_eq!(medium.stats().dropped, 2);
    }
}
