//! Newline framing for the chat wire protocol.
//!
//! Wire format: one line per message, terminated by `\n`. A `\r` directly
//! before the terminator is stripped on read; writes always use a bare `\n`.
//! Line contents are passed through untouched, so non-UTF-8 input is
//! forwarded as-is rather than rejected.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LineError;

/// Default upper bound on a single inbound line, excluding the terminator.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream into lines and writes lines back out with `\n`.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Where to resume scanning for `\n` on the next `decode` call.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    fn finish_line(&self, mut line: BytesMut) -> Result<Bytes, LineError> {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > self.max_length {
            return Err(LineError::TooLong {
                max: self.max_length,
            });
        }
        Ok(line.freeze())
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = LineError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, LineError> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(index) => {
                self.next_index = 0;
                let mut line = buf.split_to(index + 1);
                line.truncate(index);
                self.finish_line(line).map(Some)
            }
            None => {
                // Allow one extra byte for a `\r` still waiting on its `\n`.
                if buf.len() > self.max_length.saturating_add(1) {
                    return Err(LineError::TooLong {
                        max: self.max_length,
                    });
                }
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, LineError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        // Unterminated trailing fragment still counts as a line.
        let rest = buf.split();
        self.finish_line(rest).map(Some)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, line: Bytes, dst: &mut BytesMut) -> Result<(), LineError> {
        dst.reserve(line.len() + 1);
        dst.put(line);
        dst.put_u8(b'\n');
        Ok(())
    }
}
