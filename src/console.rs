//! Keystroke input source.
//!
//! Turns a byte stream (typically stdin) into SDUs. A line ends at `\n` or
//! `\r`; a line that reaches `max_payload - 1` bytes is cut and sent as is.

use tracing::debug;

/// Accumulates bytes into SDUs.
#[derive(Debug, Clone)]
pub struct LineAssembler {
    buf: Vec<u8>,
    limit: usize,
}

impl LineAssembler {
    /// Create an assembler for payloads of at most `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        let limit = max_payload.saturating_sub(1).max(1);
        Self {
            buf: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Feed one byte; returns a completed SDU, if any.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == b'\n' || byte == b'\r' {
            // CRLF and blank lines produce nothing.
            if self.buf.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.buf));
        }

        self.buf.push(byte);
        if self.buf.len() >= self.limit {
            debug!(len = self.buf.len(), "line reached maximum size, forcing it out");
            return Some(std::mem::take(&mut self.buf));
        }
        None
    }

    /// Feed a slice, collecting every SDU it completes.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Take whatever is buffered, e.g. at end of input.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        (!self.buf.is_empty()).then(|| std::mem::take(&mut self.buf))
    }

    /// Bytes buffered so far.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Largest SDU this assembler produces.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_completes_line() {
        let mut asm = LineAssembler::new(26);
        assert_eq!(asm.extend(b"hello\nworld\r"), vec![b"hello".to_vec(), b"world".to_vec()]);
        assert!(asm.pending().is_empty());
    }

    #[test]
    fn test_blank_lines_and_crlf_ignored() {
        let mut asm = LineAssembler::new(26);
        assert_eq!(asm.extend(b"\n\r\nab\r\n\n"), vec![b"ab".to_vec()]);
    }

    #[test]
    fn test_long_line_forced_out() {
        let mut asm = LineAssembler::new(5);
        assert_eq!(asm.limit(), 4);
        let lines = asm.extend(b"abcdefghij\n");
        assert_eq!(lines, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
    }

    #[test]
    fn test_flush() {
        let mut asm = LineAssembler::new(26);
        assert!(asm.push(b'x').is_none());
        assert_eq!(asm.pending(), b"x");
        assert_eq!(asm.flush(), Some(b"x".to_vec()));
        assert_eq!(asm.flush(), None);
    }

    #[test]
    fn test_tiny_payload_still_progresses() {
        let mut asm = LineAssembler::new(1);
        assert_eq!(asm.push(b'a'), Some(b"a".to_vec()));
    }
}
