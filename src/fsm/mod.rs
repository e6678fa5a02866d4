//! Stop-and-wait ARQ state machine.
//!
//! This module contains the single-threaded decision loop and the shared
//! event registry that decouples it from asynchronous producers:
//!
//! - **Event registry**: [`EventRegistry`] with one atomic flag per [`Event`]
//! - **Input slot**: [`Outbox`] holding the next SDU to transmit
//! - **Session**: [`Session`] bookkeeping (sequence numbers, retransmissions)
//! - **Machine**: [`ArqMachine`] consuming one event per [`ArqMachine::step`]
//!
//! # Architecture
//!
//! ```text
//!   link rx ──┐                                  ┌──▶ LinkLayer::send
//!   link tx ──┤  set   ┌───────────────┐  step   │
//!   timer   ──┼──────▶ │ EventRegistry │ ──────▶ ArqMachine
//!   input   ──┘        └───────────────┘  clear  │
//!                                                └──▶ RetransmitTimer
//! ```
//!
//! State diagram:
//!
//! ```text
//!            DataToSend / DataReceived
//!   ┌──────┐ ────────────────────────▶ ┌────┐
//!   │ Idle │                           │ Tx │
//!   └──────┘ ◀──── AckTxDone ───────── └────┘
//!      ▲      (timer idle)              │  ▲
//!      │                    DataTxDone  │  │ Timeout (retry) /
//!      │                    AckTxDone   │  │ DataReceived
//!      │                   (timer busy) ▼  │
//!      │   AckReceived /           ┌─────────┐
//!      └── retries exhausted ───── │ WaitAck │
//!                                  └─────────┘
//! ```

mod event;
mod machine;
mod state;

pub use event::*;
pub use machine::*;
pub use state::*;
