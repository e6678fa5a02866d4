//! Running node: the consumer loop on tokio plus a handle for the input side.
//!
//! [`ArqNode::spawn`] moves an [`ArqMachine`] onto a task that drains the
//! event registry, parks until a producer sets a flag, and repeats. The
//! returned [`NodeHandle`] is the input source's side of the contract, and
//! the [`Report`] stream surfaces what the machine did.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::{ArqConfig, ArqError, ArqResult, LinkLayer, NodeId, PduKind, RetransmitTimer};
use crate::fsm::{Action, ArqMachine, Event, EventRegistry, Outbox, State, Transition};
use crate::transport::{AddressBook, TokioTimer, UdpLink, frame};

/// Something the caller or operator should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// A new data PDU went out.
    Sent {
        /// Sequence number.
        seq: u8,
    },
    /// The peer acknowledged the outstanding PDU.
    Delivered {
        /// Sequence number.
        seq: u8,
    },
    /// The retransmission budget ran out; the payload was not delivered.
    DeliveryFailed {
        /// Sequence number.
        seq: u8,
        /// Retransmissions spent.
        retransmissions: u8,
    },
    /// A data PDU arrived and was acknowledged.
    Received {
        /// Sender.
        src: NodeId,
        /// Sequence number.
        seq: u8,
        /// SDU.
        payload: Vec<u8>,
        /// Whether it repeats the previously acknowledged PDU.
        duplicate: bool,
    },
    /// An event arrived in a state where it cannot occur and was dropped.
    ProtocolViolation {
        /// Offending event.
        event: Event,
        /// State it arrived in.
        state: State,
    },
    /// The link refused a PDU.
    LinkError {
        /// Kind of PDU.
        kind: PduKind,
        /// Sequence number it carried.
        seq: u8,
        /// Error reported by the link.
        reason: String,
    },
}

impl Report {
    /// Map a machine transition to the report it produces, if any.
    pub fn from_transition(transition: &Transition) -> Option<Self> {
        match &transition.action {
            Action::DataSent { seq } => Some(Report::Sent { seq: *seq }),
            Action::Delivered { seq } => Some(Report::Delivered { seq: *seq }),
            Action::DeliveryFailed {
                seq,
                retransmissions,
            } => Some(Report::DeliveryFailed {
                seq: *seq,
                retransmissions: *retransmissions,
            }),
            Action::Received {
                src,
                seq,
                payload,
                duplicate,
            } => Some(Report::Received {
                src: *src,
                seq: *seq,
                payload: payload.clone(),
                duplicate: *duplicate,
            }),
            Action::ProtocolViolation => Some(Report::ProtocolViolation {
                event: transition.event,
                state: transition.from,
            }),
            Action::SendFailed { kind, seq, reason } => Some(Report::LinkError {
                kind: *kind,
                seq: *seq,
                reason: reason.clone(),
            }),
            Action::TimerStarted
            | Action::AckSettled { .. }
            | Action::Retransmitted { .. }
            | Action::StaleAck { .. }
            | Action::StaleTimeout
            | Action::Discarded { .. } => None,
        }
    }
}

/// Entry points for starting a node.
#[derive(Debug)]
pub struct ArqNode;

impl ArqNode {
    /// Run `machine` on the current tokio runtime.
    ///
    /// Returns the input-side handle and the report stream.
    pub fn spawn<L, T>(machine: ArqMachine<L, T>) -> (NodeHandle, mpsc::UnboundedReceiver<Report>)
    where
        L: LinkLayer + Send + 'static,
        T: RetransmitTimer + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(machine.state());
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let config = machine.config().clone();
        let registry = Arc::clone(machine.registry());
        let outbox = Arc::clone(machine.outbox());
        let task = tokio::spawn(run(machine, state_tx, report_tx, shutdown_rx));

        let handle = NodeHandle {
            config,
            registry,
            outbox,
            state_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        };
        (handle, report_rx)
    }

    /// Bind a UDP link, build the machine and run it.
    pub async fn udp(
        config: ArqConfig,
        bind: SocketAddr,
        routes: AddressBook,
    ) -> ArqResult<(NodeHandle, mpsc::UnboundedReceiver<Report>)> {
        config.validate()?;
        let registry = Arc::new(EventRegistry::new());
        let outbox = Arc::new(Outbox::new());
        let link = UdpLink::bind(config.local_id, bind, routes, Arc::clone(&registry)).await?;
        let timer = TokioTimer::new(config.retransmit_timeout, Arc::clone(&registry));
        let machine = ArqMachine::new(config, registry, outbox, link, timer)?;
        Ok(Self::spawn(machine))
    }
}

async fn run<L, T>(
    mut machine: ArqMachine<L, T>,
    state_tx: watch::Sender<State>,
    reports: mpsc::UnboundedSender<Report>,
    mut shutdown: oneshot::Receiver<()>,
) where
    L: LinkLayer,
    T: RetransmitTimer,
{
    let registry = Arc::clone(machine.registry());
    debug!(
        local = %machine.config().local_id,
        peer = %machine.config().peer_id,
        "node loop started"
    );

    loop {
        while let Some(transition) = machine.step() {
            if let Some(report) = Report::from_transition(&transition) {
                // Nobody listening is fine; the machine keeps running.
                let _ = reports.send(report);
            }
            state_tx.send_replace(transition.to);
        }

        // A payload turned away outside Idle is offered again.
        if machine.state() == State::Idle
            && !machine.outbox().is_empty()
            && !registry.check(Event::DataToSend)
        {
            debug!("re-offering queued payload");
            registry.set(Event::DataToSend);
        }

        tokio::select! {
            _ = registry.notified() => {}
            _ = &mut shutdown => break,
        }
    }

    debug!("node loop stopped");
}

/// Input-side handle to a running node.
///
/// Dropping the handle stops the node loop.
#[derive(Debug)]
pub struct NodeHandle {
    config: ArqConfig,
    registry: Arc<EventRegistry>,
    outbox: Arc<Outbox>,
    state_rx: watch::Receiver<State>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl NodeHandle {
    /// Queue a payload if the node can take it right now.
    ///
    /// Fails with [`ArqError::Busy`] unless the machine is `Idle` and no
    /// payload is already waiting, and with a frame error if the payload
    /// exceeds the configured maximum.
    pub fn try_submit(&self, payload: impl Into<Vec<u8>>) -> ArqResult<()> {
        let payload = payload.into();
        frame::check_payload(&payload, self.config.max_payload)?;
        if self.is_finished() {
            return Err(ArqError::Shutdown);
        }
        self.offer(payload).map_err(|_| ArqError::Busy)
    }

    /// Queue a payload, waiting for the node to become idle first.
    pub async fn submit(&self, payload: impl Into<Vec<u8>>) -> ArqResult<()> {
        let payload = payload.into();
        frame::check_payload(&payload, self.config.max_payload)?;

        let mut state_rx = self.state_rx.clone();
        let mut payload = payload;
        loop {
            if self.is_finished() {
                return Err(ArqError::Shutdown);
            }
            state_rx.borrow_and_update();
            match self.offer(payload) {
                Ok(()) => return Ok(()),
                Err(returned) => payload = returned,
            }
            state_rx.changed().await.map_err(|_| ArqError::Shutdown)?;
        }
    }

    fn offer(&self, payload: Vec<u8>) -> Result<(), Vec<u8>> {
        if *self.state_rx.borrow() != State::Idle || self.registry.check(Event::DataToSend) {
            return Err(payload);
        }
        if !self.outbox.put(payload.clone()) {
            return Err(payload);
        }
        self.registry.set(Event::DataToSend);
        Ok(())
    }

    /// Wait until the machine is idle with nothing queued.
    pub async fn wait_idle(&self) -> ArqResult<()> {
        let mut state_rx = self.state_rx.clone();
        loop {
            let idle = *state_rx.borrow_and_update() == State::Idle
                && !self.registry.check(Event::DataToSend)
                && self.outbox.is_empty();
            if idle {
                return Ok(());
            }
            state_rx.changed().await.map_err(|_| ArqError::Shutdown)?;
        }
    }

    /// Last published machine state.
    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Configuration the node runs with.
    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    /// Check if the node loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop the node loop and wait for it to exit.
    ///
    /// Later submissions fail with [`ArqError::Shutdown`]. Calling it again
    /// is a no-op.
    pub async fn shutdown(&mut self) -> ArqResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| ArqError::Shutdown)?;
        }
        Ok(())
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
