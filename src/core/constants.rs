//! Protocol constants and configuration defaults.
//!
//! Wire values in this file are fixed by the frame layout and MUST NOT be
//! changed without bumping both peers.

use std::time::Duration;

// =============================================================================
// FRAME TYPES
// =============================================================================

/// Data PDU carrying a sequence number and an SDU.
pub const FRAME_TYPE_DATA: u8 = 0x00;

/// Acknowledgment PDU carrying the sequence number it confirms.
pub const FRAME_TYPE_ACK: u8 = 0x01;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Offset of the frame type byte.
pub const OFFSET_TYPE: usize = 0;

/// Offset of the sequence number byte.
pub const OFFSET_SEQ: usize = 1;

/// Offset of the first payload byte in a data PDU.
pub const OFFSET_DATA: usize = 2;

/// Data PDU header size (type + seq).
pub const DATA_HEADER_SIZE: usize = OFFSET_DATA;

/// Ack PDU size (type + seq, no payload).
pub const ACK_SIZE: usize = 2;

/// Link header size (source id + destination id).
pub const LINK_HEADER_SIZE: usize = 2;

// =============================================================================
// LIMITS
// =============================================================================

/// Largest sequence modulus representable in the one-byte seq field.
pub const MAX_SEQ_MODULUS: u16 = 256;

/// Smallest usable sequence modulus.
pub const MIN_SEQ_MODULUS: u16 = 2;

/// Upper bound on the configurable payload size.
pub const MAX_PAYLOAD_LIMIT: usize = 1024;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default sequence modulus `N`.
pub const DEFAULT_SEQ_MODULUS: u16 = MAX_SEQ_MODULUS;

/// Default retransmission budget per outstanding frame.
pub const DEFAULT_MAX_RETRANSMISSIONS: u8 = 3;

/// Default maximum SDU size in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 26;

/// Default retransmission timer duration.
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(2000);
