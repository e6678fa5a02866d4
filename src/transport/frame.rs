//! PDU encoding and decoding.
//!
//! Wire format:
//! ```text
//! Data PDU:                          Ack PDU:
//! +--------+--------+-------------+  +--------+--------+
//! | Type   | Seq    | Payload     |  | Type   | Seq    |
//! | 0x00   | 1 byte | 0..max      |  | 0x01   | 1 byte |
//! +--------+--------+-------------+  +--------+--------+
//! ```
//!
//! Addressing is not part of the PDU; the link layer carries it.

use crate::core::{
    ACK_SIZE, DATA_HEADER_SIZE, FRAME_TYPE_ACK, FRAME_TYPE_DATA, FrameError, OFFSET_DATA,
    OFFSET_SEQ, OFFSET_TYPE, PduKind,
};

/// A decoded PDU borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu<'a> {
    /// Data PDU.
    Data {
        /// Sequence number.
        seq: u8,
        /// SDU bytes.
        payload: &'a [u8],
    },
    /// Acknowledgment PDU.
    Ack {
        /// Sequence number being acknowledged.
        seq: u8,
    },
}

impl<'a> Pdu<'a> {
    /// Parse a PDU.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, FrameError> {
        let seq = decode_seq(bytes)?;
        match frame_kind(bytes)? {
            PduKind::Data => Ok(Pdu::Data {
                seq,
                payload: &bytes[OFFSET_DATA..],
            }),
            PduKind::Ack => Ok(Pdu::Ack { seq }),
        }
    }

    /// Serialize the PDU.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Pdu::Data { seq, payload } => encode_data(seq, payload),
            Pdu::Ack { seq } => encode_ack(seq).to_vec(),
        }
    }

    /// Sequence number carried by the PDU.
    pub fn seq(&self) -> u8 {
        match *self {
            Pdu::Data { seq, .. } | Pdu::Ack { seq } => seq,
        }
    }

    /// Kind of the PDU.
    pub fn kind(&self) -> PduKind {
        match self {
            Pdu::Data { .. } => PduKind::Data,
            Pdu::Ack { .. } => PduKind::Ack,
        }
    }
}

/// Encode a data PDU.
pub fn encode_data(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_HEADER_SIZE + payload.len());
    buf.push(FRAME_TYPE_DATA);
    buf.push(seq);
    buf.extend_from_slice(payload);
    buf
}

/// Encode an ack PDU.
pub fn encode_ack(seq: u8) -> [u8; ACK_SIZE] {
    let mut buf = [0u8; ACK_SIZE];
    buf[OFFSET_TYPE] = FRAME_TYPE_ACK;
    buf[OFFSET_SEQ] = seq;
    buf
}

/// Classify a PDU by its type byte.
pub fn frame_kind(bytes: &[u8]) -> Result<PduKind, FrameError> {
    check_header(bytes)?;
    match bytes[OFFSET_TYPE] {
        FRAME_TYPE_DATA => Ok(PduKind::Data),
        FRAME_TYPE_ACK => Ok(PduKind::Ack),
        other => Err(FrameError::UnknownType(other)),
    }
}

/// Read the sequence number of a data or ack PDU.
pub fn decode_seq(bytes: &[u8]) -> Result<u8, FrameError> {
    check_header(bytes)?;
    Ok(bytes[OFFSET_SEQ])
}

/// Borrow the SDU of a data PDU.
///
/// An ack PDU has an empty payload.
pub fn decode_payload(bytes: &[u8]) -> Result<&[u8], FrameError> {
    check_header(bytes)?;
    Ok(&bytes[OFFSET_DATA..])
}

/// Reject payloads larger than `max`.
pub fn check_payload(payload: &[u8], max: usize) -> Result<(), FrameError> {
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            max,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn check_header(bytes: &[u8]) -> Result<(), FrameError> {
    if bytes.len() < DATA_HEADER_SIZE {
        return Err(FrameError::TooShort {
            expected: DATA_HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    Ok(())
}
