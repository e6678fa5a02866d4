//! Link-layer, timer and codec implementations.
//!
//! The state machine only knows the [`LinkLayer`](crate::core::LinkLayer) and
//! [`RetransmitTimer`](crate::core::RetransmitTimer) traits. This module
//! provides the implementations used by a running node:
//!
//! - **Codec**: [`frame`] encodes and decodes data and ack PDUs
//! - **UDP link**: [`UdpLink`] carries PDUs between addressed nodes
//! - **Simulated link**: [`SimMedium`] / [`SimLink`] for in-process tests
//! - **Timer**: [`TokioTimer`] raises `Timeout` on the tokio clock
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ArqMachine                   │
//! ├─────────────────────────────────────────┤
//! │   frame codec   │  TokioTimer           │  ← This module
//! │   UdpLink / SimLink                     │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

pub mod frame;
mod inbox;
mod link;
mod sim;
mod timer;

pub use inbox::Inbox;
pub use link::*;
pub use sim::*;
pub use timer::TokioTimer;
