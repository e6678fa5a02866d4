//! Error types for the ARQ node.

use thiserror::Error;

use super::config::NodeId;

/// Errors that can occur when decoding a PDU.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the header it must contain.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Frame type byte is neither data nor ack.
    #[error("unknown frame type: {0:#04x}")]
    UnknownType(u8),

    /// Payload does not fit the configured maximum.
    #[error("payload of {actual} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Configured maximum.
        max: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Top-level ARQ errors.
#[derive(Debug, Error)]
pub enum ArqError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Frame error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload is already outstanding or the machine is not idle.
    #[error("node busy: a frame is already outstanding")]
    Busy,

    /// The destination has no known link address.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// The node loop has stopped.
    #[error("node shut down")]
    Shutdown,
}

impl ArqError {
    /// Check if the caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArqError::Busy)
    }
}

/// Result type for ARQ operations.
pub type ArqResult<T> = Result<T, ArqError>;
