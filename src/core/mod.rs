//! Core types, constants, and collaborator traits.
//!
//! This module has no runtime dependencies and defines the abstractions the
//! state machine is written against: node addressing, configuration, errors,
//! and the link-layer and timer seams.

mod config;
mod constants;
mod error;
mod traits;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use traits::*;
