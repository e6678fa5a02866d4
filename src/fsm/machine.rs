//! The ARQ decision loop.
//!
//! [`ArqMachine::step`] consumes at most one event per call. Within each
//! state the registry is checked in a fixed priority order and the first
//! pending event wins; lower-priority flags stay set for a later step.
//!
//! | State   | Priority order                                               |
//! |---------|--------------------------------------------------------------|
//! | Idle    | DataReceived, DataToSend, {DataTxDone, AckTxDone, AckReceived} (violations), Timeout (stale) |
//! | Tx      | DataTxDone, AckTxDone, DataToSend (violation); rest deferred |
//! | WaitAck | AckReceived, Timeout, DataReceived, {DataToSend, DataTxDone, AckTxDone} (violations) |

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::event::{Event, EventRegistry, Outbox};
use super::state::{PendingFrame, Session, State};
use crate::core::{ArqConfig, ArqResult, LinkLayer, NodeId, PduKind, RetransmitTimer};
use crate::transport::frame;

/// What the machine did while consuming an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A new data PDU was handed to the link.
    DataSent {
        /// Sequence number of the PDU.
        seq: u8,
    },
    /// A data PDU was received and an ack handed to the link.
    Received {
        /// Sender of the data PDU.
        src: NodeId,
        /// Sequence number received (and acknowledged).
        seq: u8,
        /// SDU carried by the PDU.
        payload: Vec<u8>,
        /// Whether this repeats the previously acknowledged PDU.
        duplicate: bool,
    },
    /// Data transmission completed; the retransmission timer is armed.
    TimerStarted,
    /// Ack transmission completed.
    AckSettled {
        /// Whether the machine went back to waiting for its own ack.
        resumed_wait: bool,
    },
    /// The outstanding PDU was acknowledged.
    Delivered {
        /// Sequence number of the delivered PDU.
        seq: u8,
    },
    /// The outstanding PDU was resent after a timeout.
    Retransmitted {
        /// Sequence number of the PDU.
        seq: u8,
        /// Retransmission count after this resend.
        attempt: u8,
    },
    /// The retransmission budget ran out.
    DeliveryFailed {
        /// Sequence number of the abandoned PDU.
        seq: u8,
        /// Retransmissions spent.
        retransmissions: u8,
    },
    /// An ack for some other sequence number was dropped.
    StaleAck {
        /// Sequence number carried by the ack.
        seq: u8,
    },
    /// A timer expiry with nothing outstanding was dropped.
    StaleTimeout,
    /// The event cannot legitimately occur in this state and was dropped.
    ProtocolViolation,
    /// The link refused a PDU.
    SendFailed {
        /// Kind of PDU refused.
        kind: PduKind,
        /// Sequence number carried by the PDU.
        seq: u8,
        /// Error reported by the link.
        reason: String,
    },
    /// The event had no usable data behind it and was dropped.
    Discarded {
        /// Why it was dropped.
        reason: String,
    },
}

/// Result of one [`ArqMachine::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Event consumed.
    pub event: Event,
    /// State before the step.
    pub from: State,
    /// State after the step.
    pub to: State,
    /// What was done.
    pub action: Action,
}

/// Stop-and-wait ARQ state machine.
///
/// Generic over the link layer and the retransmission timer so the same
/// logic runs over UDP, the in-process simulator, or test doubles.
#[derive(Debug)]
pub struct ArqMachine<L, T> {
    config: ArqConfig,
    session: Session,
    registry: Arc<EventRegistry>,
    outbox: Arc<Outbox>,
    link: L,
    timer: T,
}

impl<L: LinkLayer, T: RetransmitTimer> ArqMachine<L, T> {
    /// Create a machine in `Idle`.
    ///
    /// Clears every pending flag, like a fresh boot. Fails with
    /// [`ArqError::Config`](crate::core::ArqError::Config) if `config` does not validate.
    pub fn new(
        config: ArqConfig,
        registry: Arc<EventRegistry>,
        outbox: Arc<Outbox>,
        link: L,
        timer: T,
    ) -> ArqResult<Self> {
        config.validate()?;
        registry.clear_all();
        Ok(Self {
            session: Session::new(&config),
            config,
            registry,
            outbox,
            link,
            timer,
        })
    }

    /// Consume the highest-priority relevant event, if any.
    ///
    /// Returns `None` when nothing is pending or every pending event is
    /// deferred in the current state.
    pub fn step(&mut self) -> Option<Transition> {
        let from = self.session.state;
        let (event, action) = match from {
            State::Idle => self.step_idle(),
            State::Tx => self.step_tx(),
            State::WaitAck => self.step_wait_ack(),
        }?;
        let to = self.session.state;

        if from != to {
            debug!(%from, %to, %event, "state transition");
        }

        Some(Transition {
            event,
            from,
            to,
            action,
        })
    }

    /// Step until only deferred events (or none) remain.
    pub fn drain(&mut self) -> Vec<Transition> {
        std::iter::from_fn(|| self.step()).collect()
    }

    fn step_idle(&mut self) -> Option<(Event, Action)> {
        // Inbound data is never starved by local send intent.
        if self.registry.check(Event::DataReceived) {
            return Some((Event::DataReceived, self.acknowledge()));
        }
        if self.registry.check(Event::DataToSend) {
            return Some((Event::DataToSend, self.transmit_new()));
        }
        for event in [Event::DataTxDone, Event::AckTxDone, Event::AckReceived] {
            if self.registry.check(event) {
                return Some((event, self.violation(event)));
            }
        }
        if self.registry.clear(Event::Timeout) {
            debug!("dropping stale timeout while idle");
            return Some((Event::Timeout, Action::StaleTimeout));
        }
        None
    }

    fn step_tx(&mut self) -> Option<(Event, Action)> {
        if self.registry.check(Event::DataTxDone) {
            self.timer.start();
            self.session.state = State::WaitAck;
            self.registry.clear(Event::DataTxDone);
            return Some((Event::DataTxDone, Action::TimerStarted));
        }
        if self.registry.check(Event::AckTxDone) {
            let outstanding = self.timer.is_running() || self.registry.check(Event::Timeout);
            self.session.state = if outstanding {
                State::WaitAck
            } else {
                State::Idle
            };
            self.registry.clear(Event::AckTxDone);
            return Some((
                Event::AckTxDone,
                Action::AckSettled {
                    resumed_wait: outstanding,
                },
            ));
        }
        if self.registry.check(Event::DataToSend) {
            return Some((Event::DataToSend, self.violation(Event::DataToSend)));
        }
        // DataReceived, AckReceived and Timeout stay pending until we leave Tx.
        None
    }

    fn step_wait_ack(&mut self) -> Option<(Event, Action)> {
        if self.registry.check(Event::AckReceived) {
            return Some((Event::AckReceived, self.on_ack()));
        }
        if self.registry.check(Event::Timeout) {
            return Some((Event::Timeout, self.on_timeout()));
        }
        if self.registry.check(Event::DataReceived) {
            return Some((Event::DataReceived, self.acknowledge()));
        }
        for event in [Event::DataToSend, Event::DataTxDone, Event::AckTxDone] {
            if self.registry.check(event) {
                return Some((event, self.violation(event)));
            }
        }
        None
    }

    /// Ack the pending data PDU back to its sender and enter `Tx`.
    fn acknowledge(&mut self) -> Action {
        let received = self.link.received_data();
        self.registry.clear(Event::DataReceived);

        let Some(pdu) = received else {
            warn!("data received event without a pending PDU");
            return Action::Discarded {
                reason: "no received data PDU".into(),
            };
        };
        let (seq, payload) = match frame::decode_seq(&pdu.bytes)
            .and_then(|seq| Ok((seq, frame::decode_payload(&pdu.bytes)?.to_vec())))
        {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(src = %pdu.src, error = %e, "dropping undecodable data PDU");
                return Action::Discarded {
                    reason: e.to_string(),
                };
            }
        };

        let ack = frame::encode_ack(seq);
        if let Err(e) = self.link.send(&ack, pdu.src, PduKind::Ack) {
            warn!(dest = %pdu.src, seq, error = %e, "link refused ack");
            return Action::SendFailed {
                kind: PduKind::Ack,
                seq,
                reason: e.to_string(),
            };
        }

        let duplicate = self.session.record_received(pdu.src, seq);
        info!(
            src = %pdu.src,
            seq,
            len = pdu.len(),
            duplicate,
            "received data, sending ack"
        );
        self.session.state = State::Tx;

        Action::Received {
            src: pdu.src,
            seq,
            payload,
            duplicate,
        }
    }

    /// Encode the queued SDU with the current `tx_seq` and send it.
    fn transmit_new(&mut self) -> Action {
        let payload = self.outbox.take();
        self.registry.clear(Event::DataToSend);

        let Some(payload) = payload else {
            warn!("data to send event with an empty outbox");
            return Action::Discarded {
                reason: "no queued payload".into(),
            };
        };

        let seq = self.session.tx_seq;
        let bytes = frame::encode_data(seq, &payload);
        if let Err(e) = self.link.send(&bytes, self.config.peer_id, PduKind::Data) {
            warn!(dest = %self.config.peer_id, seq, error = %e, "link refused data PDU");
            return Action::SendFailed {
                kind: PduKind::Data,
                seq,
                reason: e.to_string(),
            };
        }

        info!(dest = %self.config.peer_id, seq, len = payload.len(), "sending data");
        self.session.pending_frame = Some(PendingFrame { seq, bytes });
        self.session.advance_seq();
        self.session.retx_count = 0;
        self.session.state = State::Tx;

        Action::DataSent { seq }
    }

    fn on_ack(&mut self) -> Action {
        let ack = self.link.received_ack();
        self.registry.clear(Event::AckReceived);

        let Some(pending) = self.session.pending_frame.as_ref() else {
            // Nothing to confirm; fall back to idle rather than wait forever.
            self.timer.stop();
            self.session.state = State::Idle;
            let seq = ack.and_then(|pdu| frame::decode_seq(&pdu.bytes).ok());
            return Action::StaleAck {
                seq: seq.unwrap_or_default(),
            };
        };
        let seq = pending.seq;

        // Anything but a readable ack from the peer leaves the timer in charge.
        let Some(pdu) = ack else {
            warn!(expected = seq, "ack received event without a pending PDU");
            return Action::Discarded {
                reason: "no received ack PDU".into(),
            };
        };
        if pdu.src != self.config.peer_id {
            warn!(src = %pdu.src, peer = %self.config.peer_id, "dropping ack from a foreign node");
            return Action::Discarded {
                reason: format!("ack from node {} instead of {}", pdu.src, self.config.peer_id),
            };
        }
        let acked = match frame::decode_seq(&pdu.bytes) {
            Ok(acked) => acked,
            Err(e) => {
                warn!(src = %pdu.src, error = %e, "dropping undecodable ack PDU");
                return Action::Discarded {
                    reason: e.to_string(),
                };
            }
        };
        if acked != seq {
            debug!(acked, expected = seq, "dropping ack for another sequence number");
            return Action::StaleAck { seq: acked };
        }

        info!(seq, retransmissions = self.session.retx_count, "ack received");
        self.timer.stop();
        self.registry.clear(Event::Timeout);
        self.session.pending_frame = None;
        self.session.state = State::Idle;

        Action::Delivered { seq }
    }

    fn on_timeout(&mut self) -> Action {
        self.registry.clear(Event::Timeout);

        let Some(pending) = self.session.pending_frame.as_ref() else {
            self.session.state = State::Idle;
            return Action::StaleTimeout;
        };
        let seq = pending.seq;

        if self.session.retx_count >= self.config.max_retransmissions {
            warn!(
                seq,
                retransmissions = self.session.retx_count,
                "retransmission budget exhausted, giving up"
            );
            let retransmissions = self.session.retx_count;
            self.session.pending_frame = None;
            self.session.state = State::Idle;
            return Action::DeliveryFailed {
                seq,
                retransmissions,
            };
        }

        self.session.retx_count += 1;
        let attempt = self.session.retx_count;
        if let Err(e) = self
            .link
            .send(&pending.bytes, self.config.peer_id, PduKind::Data)
        {
            // Count the attempt and re-arm so the budget still bounds us.
            warn!(seq, attempt, error = %e, "link refused retransmission");
            self.timer.start();
            return Action::SendFailed {
                kind: PduKind::Data,
                seq,
                reason: e.to_string(),
            };
        }

        info!(seq, attempt, "timeout, retransmitting");
        self.session.state = State::Tx;
        Action::Retransmitted { seq, attempt }
    }

    fn violation(&mut self, event: Event) -> Action {
        warn!(%event, state = %self.session.state, "event cannot happen in this state");
        self.registry.clear(event);
        Action::ProtocolViolation
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.session.state
    }

    /// Session bookkeeping.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Configuration the machine was built with.
    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    /// Shared event registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Shared input slot.
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Link layer.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable link layer.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Retransmission timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }
}
