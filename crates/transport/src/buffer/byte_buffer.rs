//! A fixed capacity byte buffer with explicit fill and drain phases.
//!
//! The buffer is either [`Filling`](BufferState::Filling), accepting bytes at
//! `position` up to the capacity, or [`Draining`](BufferState::Draining),
//! handing out the bytes between `position` and `limit`. Moving between the
//! two phases only happens through [`flip`](ByteBuffer::flip),
//! [`compact`](ByteBuffer::compact) and [`clear`](ByteBuffer::clear), so a
//! buffer is never written and read at the same time.

use std::cmp;
use std::fmt;

use bytes::Buf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// accepting bytes
    Filling,
    /// handing out bytes
    Draining,
}

pub struct ByteBuffer {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
    state: BufferState,
}

impl ByteBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity].into_boxed_slice(), position: 0, limit: capacity, state: BufferState::Filling }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn state(&self) -> BufferState {
        self.state
    }

    #[inline]
    pub fn is_filling(&self) -> bool {
        self.state == BufferState::Filling
    }

    #[inline]
    pub fn is_draining(&self) -> bool {
        self.state == BufferState::Draining
    }

    /// Free room while filling, `0` while draining.
    #[inline]
    pub fn spare(&self) -> usize {
        match self.state {
            BufferState::Filling => self.limit - self.position,
            BufferState::Draining => 0,
        }
    }

    /// Unread bytes while draining, `0` while filling.
    #[inline]
    pub fn pending(&self) -> usize {
        match self.state {
            BufferState::Filling => 0,
            BufferState::Draining => self.limit - self.position,
        }
    }

    /// The writable part of the buffer, empty unless filling.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        match self.state {
            BufferState::Filling => &mut self.data[self.position..self.limit],
            BufferState::Draining => &mut [],
        }
    }

    /// Marks `n` bytes of [`spare_mut`](Self::spare_mut) as written.
    pub fn advance_mut(&mut self, n: usize) {
        debug_assert!(self.is_filling(), "advance_mut while draining");
        assert!(n <= self.spare(), "advance_mut past capacity: {n} > {}", self.spare());
        self.position += n;
    }

    /// Copies as much of `src` as fits, returning the copied length.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let n = cmp::min(src.len(), self.spare());
        if n == 0 {
            return 0;
        }
        self.spare_mut()[..n].copy_from_slice(&src[..n]);
        self.advance_mut(n);
        n
    }

    /// The readable part of the buffer, empty unless draining.
    pub fn readable(&self) -> &[u8] {
        match self.state {
            BufferState::Filling => &[],
            BufferState::Draining => &self.data[self.position..self.limit],
        }
    }

    /// Switches from filling to draining the bytes written so far.
    pub fn flip(&mut self) {
        debug_assert!(self.is_filling(), "flip while draining");
        self.limit = self.position;
        self.position = 0;
        self.state = BufferState::Draining;
    }

    /// Moves the unread tail to the front and switches back to filling after it.
    pub fn compact(&mut self) {
        debug_assert!(self.is_draining(), "compact while filling");
        let remaining = self.limit - self.position;
        self.data.copy_within(self.position..self.limit, 0);
        self.position = remaining;
        self.limit = self.capacity();
        self.state = BufferState::Filling;
    }

    /// Forgets every byte and switches back to filling.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
        self.state = BufferState::Filling;
    }
}

/// Reading side of a draining buffer.
impl Buf for ByteBuffer {
    fn remaining(&self) -> usize {
        self.pending()
    }

    fn chunk(&self) -> &[u8] {
        self.readable()
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.pending(), "advance past limit: {cnt} > {}", self.pending());
        self.position += cnt;
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("capacity", &self.capacity())
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_flip_drain() {
        let mut buffer = ByteBuffer::with_capacity(8);
        assert!(buffer.is_filling());
        assert_eq!(buffer.spare(), 8);

        assert_eq!(buffer.put_slice(b"hello"), 5);
        assert_eq!(buffer.spare(), 3);

        buffer.flip();
        assert!(buffer.is_draining());
        assert_eq!(buffer.readable(), b"hello");
        assert_eq!(buffer.spare(), 0);
        assert!(buffer.spare_mut().is_empty());

        buffer.advance(2);
        assert_eq!(buffer.readable(), b"llo");
        assert_eq!(buffer.remaining(), 3);
    }

    #[test]
    fn put_slice_never_passes_capacity() {
        let mut buffer = ByteBuffer::with_capacity(4);
        assert_eq!(buffer.put_slice(b"abcdef"), 4);
        assert_eq!(buffer.put_slice(b"gh"), 0);
        assert_eq!(buffer.position(), 4);

        buffer.flip();
        assert_eq!(buffer.readable(), b"abcd");
    }

    #[test]
    fn compact_keeps_the_unread_tail() {
        let mut buffer = ByteBuffer::with_capacity(8);
        buffer.put_slice(b"abcdef");
        buffer.flip();
        buffer.advance(4);

        buffer.compact();
        assert!(buffer.is_filling());
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.spare(), 6);

        buffer.put_slice(b"gh");
        buffer.flip();
        assert_eq!(buffer.readable(), b"efgh");
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = ByteBuffer::with_capacity(8);
        buffer.put_slice(b"abc");
        buffer.flip();
        buffer.clear();

        assert!(buffer.is_filling());
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 8);
        assert!(!buffer.has_remaining());
    }

    #[test]
    #[should_panic(expected = "advance past limit")]
    fn advance_never_passes_the_limit() {
        let mut buffer = ByteBuffer::with_capacity(8);
        buffer.put_slice(b"abc");
        buffer.flip();
        buffer.advance(4);
    }
}
