//! # stopwait-arq
//!
//! Stop-and-wait Automatic Repeat reQuest over an unreliable point-to-point
//! link.
//!
//! A node sends one data PDU at a time to its peer, waits for a positive
//! acknowledgment, and resends on timeout up to a bounded number of times.
//! It also acknowledges data PDUs arriving from the peer. All of this is
//! driven by a single consumer loop over a set of event flags raised by
//! asynchronous producers (link receive, transmit completion, the timer and
//! the input source).
//!
//! ## Feature Flags
//!
//! - `cli` (default): the `arq-node` binary, TOML config file and log setup
//!
//! ## Modules
//!
//! - [`core`]: Constants, errors, configuration and collaborator traits
//! - [`fsm`]: Event registry and the ARQ state machine
//! - [`transport`]: Frame codec, UDP link, simulated link and tokio timer
//! - [`node`]: Running a machine on tokio and feeding it payloads
//! - [`console`]: Assembling SDUs from keystrokes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use stopwait_arq::prelude::*;
//!
//! # async fn run() -> ArqResult<()> {
//! let config = ArqConfig::builder(NodeId(1), NodeId(0)).build()?;
//! let routes = AddressBook::new().with_route(NodeId(0), "127.0.0.1:9000".parse().unwrap());
//!
//! let (mut node, mut reports) = ArqNode::udp(config, "127.0.0.1:9001".parse().unwrap(), routes).await?;
//! node.submit(b"hello".to_vec()).await?;
//!
//! while let Some(report) = reports.recv().await {
//!     if let Report::Delivered { seq } = report {
//!         println!("PDU {seq} acknowledged");
//!         break;
//!     }
//! }
//! node.shutdown().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod console;
pub mod core;
pub mod fsm;
pub mod node;
pub mod transport;

// Config file and logging (binary support)
#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod config;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::fsm::{Action, ArqMachine, Event, EventRegistry, Outbox, State, Transition};
    pub use crate::node::{ArqNode, NodeHandle, Report};
    pub use crate::transport::{AddressBook, SimLink, SimMedium, TokioTimer, UdpLink};
}

// Re-export commonly used items at crate root
pub use crate::core::{ArqConfig, ArqError, ArqResult, NodeId};
pub use crate::fsm::{ArqMachine, Event, EventRegistry, State};
pub use crate::node::{ArqNode, NodeHandle, Report};
