//! Collaborator traits for the ARQ state machine.
//!
//! The machine never touches sockets or clocks directly. It talks to a
//! [`LinkLayer`] and a [`RetransmitTimer`], both of which report completion
//! asynchronously by raising flags in the event registry.

use super::config::NodeId;
use super::error::ArqResult;

/// Which kind of PDU is being handed to the link layer.
///
/// The link layer uses this to decide which completion event to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduKind {
    /// Data PDU; completion raises `DataTxDone`.
    Data,
    /// Ack PDU; completion raises `AckTxDone`.
    Ack,
}

/// A PDU surfaced by the link layer, together with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPdu {
    /// Node the PDU came from.
    pub src: NodeId,
    /// Raw PDU bytes (codec-encoded).
    pub bytes: Vec<u8>,
}

impl ReceivedPdu {
    /// Create a received PDU.
    pub fn new(src: NodeId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            src,
            bytes: bytes.into(),
        }
    }

    /// Length of the raw PDU.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the PDU is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Link-layer transmission and reception for one addressed node.
///
/// # Requirements
///
/// - `send` MUST NOT block; completion is signalled later by raising
///   `DataTxDone` or `AckTxDone` according to `kind`
/// - a completion MUST be raised for every accepted `send`, even if the
///   frame was lost on the medium
/// - `received_data`/`received_ack` return the most recent PDU of that kind
///   that raised `DataReceived`/`AckReceived`
pub trait LinkLayer {
    /// Hand a PDU to the link for delivery to `dest`.
    fn send(&mut self, pdu: &[u8], dest: NodeId, kind: PduKind) -> ArqResult<()>;

    /// Data PDU that raised the pending `DataReceived` event.
    fn received_data(&self) -> Option<ReceivedPdu>;

    /// Ack PDU that raised the pending `AckReceived` event.
    fn received_ack(&self) -> Option<ReceivedPdu>;
}

/// Single-shot retransmission timer.
///
/// `start` arms one countdown of the configured duration, raising exactly
/// one `Timeout` on expiry unless stopped first. `stop` never retracts a
/// `Timeout` that has already been raised.
pub trait RetransmitTimer {
    /// Arm the timer, restarting it if it is already running.
    fn start(&mut self);

    /// Disarm the timer.
    fn stop(&mut self);

    /// Check if a countdown is in progress.
    fn is_running(&self) -> bool;
}

impl<L: LinkLayer + ?Sized> LinkLayer for Box<L> {
    fn send(&mut self, pdu: &[u8], dest: NodeId, kind: PduKind) -> ArqResult<()> {
        (**self).send(pdu, dest, kind)
    }

    fn received_data(&self) -> Option<ReceivedPdu> {
        (**self).received_data()
    }

    fn received_ack(&self) -> Option<ReceivedPdu> {
        (**self).received_ack()
    }
}

impl<T: RetransmitTimer + ?Sized> RetransmitTimer for Box<T> {
    fn start(&mut self) {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
