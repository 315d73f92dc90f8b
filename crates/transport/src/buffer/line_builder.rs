//! Accumulator for a single HTTP line.
//!
//! On the inbound side bytes are collected from the byte buffer until a line
//! feed shows up, however many reads that takes. On the outbound side the
//! framer writes one start line or header line into it and the way copies it
//! into the byte buffer piece by piece, trimming what was copied.

use std::cmp;
use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::buffer::ByteBuffer;
use crate::ensure;
use crate::protocol::ParseError;

#[derive(Debug)]
pub struct LineBuilder {
    line: BytesMut,
    max_len: usize,
}

impl LineBuilder {
    pub fn new(max_len: usize) -> Self {
        Self { line: BytesMut::with_capacity(cmp::min(max_len, 256)), max_len }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.line
    }

    pub fn clear(&mut self) {
        self.line.clear();
    }

    /// Moves bytes from `src` into the builder up to and including the next `\n`.
    ///
    /// Returns `Ok(true)` once a whole line is held, which must be taken with
    /// [`take_line`](Self::take_line) before reading again.
    pub fn read_line<B: Buf>(&mut self, src: &mut B) -> Result<bool, ParseError> {
        debug_assert!(!self.line.ends_with(b"\n"), "previous line was not taken");

        while src.has_remaining() {
            let chunk = src.chunk();
            let (take, found) = match chunk.iter().position(|b| *b == b'\n') {
                Some(index) => (index + 1, true),
                None => (chunk.len(), false),
            };

            let current_size = self.line.len() + take;
            ensure!(current_size <= self.max_len, ParseError::too_large_header(current_size, self.max_len));

            self.line.extend_from_slice(&chunk[..take]);
            src.advance(take);

            if found {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Takes the held line without its line terminator, leaving the builder empty.
    pub fn take_line(&mut self) -> Bytes {
        let mut line = self.line.split().freeze();
        if line.ends_with(b"\n") {
            line.truncate(line.len() - 1);
        }
        if line.ends_with(b"\r") {
            line.truncate(line.len() - 1);
        }
        line
    }

    /// Copies as much of the line as fits into `buffer` and trims the copied bytes.
    pub fn copy_to(&mut self, buffer: &mut ByteBuffer) -> usize {
        let n = buffer.put_slice(&self.line);
        self.line.advance(n);
        n
    }
}

/// Lets start lines and headers be written with `write!`.
impl io::Write for LineBuilder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.line.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
