//! Receive slots shared between a link's producer side and the machine.

use parking_lot::Mutex;
use tracing::debug;

use crate::core::{PduKind, ReceivedPdu};
use crate::fsm::{Event, EventRegistry};

/// Last received data and ack PDUs.
///
/// A data PDU is only stored when the previous one has been consumed, i.e.
/// `DataReceived` is clear; otherwise it is dropped and the sender's
/// retransmission brings it back. Acks simply overwrite.
#[derive(Debug, Default)]
pub struct Inbox {
    data: Mutex<Option<ReceivedPdu>>,
    ack: Mutex<Option<ReceivedPdu>>,
}

impl Inbox {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a PDU and raise the matching event.
    ///
    /// Returns `false` if the PDU was dropped.
    pub fn deliver(&self, registry: &EventRegistry, kind: PduKind, pdu: ReceivedPdu) -> bool {
        match kind {
            PduKind::Data => {
                let mut slot = self.data.lock();
                if registry.check(Event::DataReceived) {
                    debug!(src = %pdu.src, "previous data PDU not consumed, dropping");
                    return false;
                }
                *slot = Some(pdu);
                registry.set(Event::DataReceived);
            }
            PduKind::Ack => {
                *self.ack.lock() = Some(pdu);
                registry.set(Event::AckReceived);
            }
        }
        true
    }

    /// Most recently stored data PDU.
    pub fn data(&self) -> Option<ReceivedPdu> {
        self.data.lock().clone()
    }

    /// Most recently stored ack PDU.
    pub fn ack(&self) -> Option<ReceivedPdu> {
        self.ack.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;

    #[test]
    fn test_data_held_until_consumed() {
        let registry = EventRegistry::new();
        let inbox = Inbox::new();

        assert!(inbox.deliver(&registry, PduKind::Data, ReceivedPdu::new(NodeId(1), vec![0, 0])));
        assert!(!inbox.deliver(&registry, PduKind::Data, ReceivedPdu::new(NodeId(1), vec![0, 1])));
        assert_eq!(inbox.data().unwrap().bytes, vec![0, 0]);

        registry.clear(Event::DataReceived);
        assert!(inbox.deliver(&registry, PduKind::Data, ReceivedPdu::new(NodeId(1), vec![0, 1])));
        assert_eq!(inbox.data().unwrap().bytes, vec![0, 1]);
    }

    #[test]
    fn test_acks_overwrite() {
        let registry = EventRegistry::new();
        let inbox = Inbox::new();

        inbox.deliver(&registry, PduKind::Ack, ReceivedPdu::new(NodeId(2), vec![1, 0]));
        inbox.deliver(&registry, PduKind::Ack, ReceivedPdu::new(NodeId(2), vec![1, 1]));
        assert_eq!(inbox.ack().unwrap().bytes, vec![1, 1]);
        assert!(registry.check(Event::AckReceived));
        assert!(!registry.check(Event::DataReceived));
    }
}
