//! Encoder for `Transfer-Encoding: chunked` entities.
//!
//! Every read of the entity channel becomes one chunk, written in place:
//! the channel fills the middle of the destination, leaving room in front for
//! the hex size line and two bytes behind for the CRLF, and the data is then
//! shifted left against the size line actually needed.

use std::cmp;
use std::io::Write;
use std::task::{Context, Poll, ready};

use tracing::trace;

use crate::channel::BoxEntityChannel;
use crate::protocol::{EntityChannelType, PayloadItem, SendError};
use crate::utils::hex_len;

const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

#[derive(Debug)]
pub struct ChunkedEncoder {
    channel: BoxEntityChannel,
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Reading data chunks from the channel
    Data,
    /// Writing the last chunk, holding how much of it went out
    LastChunk(usize),
    End,
}

impl ChunkedEncoder {
    pub fn new(channel: BoxEntityChannel) -> Self {
        Self { channel, state: ChunkedState::Data }
    }

    pub fn channel_type(&self) -> EntityChannelType {
        self.channel.channel_type()
    }

    pub fn is_finish(&self) -> bool {
        self.state == ChunkedState::End
    }

    /// Writes the next chunk into `dst`.
    ///
    /// `Chunk(0)` means `dst` is too small to hold a chunk with at least one
    /// data byte and has to be drained first.
    pub fn poll_transfer(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<Result<PayloadItem, SendError>> {
        loop {
            match self.state {
                ChunkedState::Data => {
                    let reserve = hex_len(dst.len()) + 2;
                    if dst.len() <= reserve + 2 {
                        return Poll::Ready(Ok(PayloadItem::Chunk(0)));
                    }

                    let data_end = dst.len() - 2;
                    let n = ready!(self.channel.poll_read(cx, &mut dst[reserve..data_end]))?;
                    if n == 0 {
                        trace!("entity exhausted, writing last chunk");
                        self.state = ChunkedState::LastChunk(0);
                        continue;
                    }

                    let prefix_len = hex_len(n) + 2;
                    {
                        let mut prefix = &mut dst[..prefix_len];
                        write!(prefix, "{n:X}\r\n")?;
                    }
                    dst.copy_within(reserve..reserve + n, prefix_len);
                    dst[prefix_len + n..prefix_len + n + 2].copy_from_slice(b"\r\n");

                    trace!(len = n, "write entity chunk");
                    return Poll::Ready(Ok(PayloadItem::Chunk(prefix_len + n + 2)));
                }

                ChunkedState::LastChunk(written) => {
                    if dst.is_empty() {
                        return Poll::Ready(Ok(PayloadItem::Chunk(0)));
                    }

                    let n = cmp::min(dst.len(), LAST_CHUNK.len() - written);
                    dst[..n].copy_from_slice(&LAST_CHUNK[written..written + n]);

                    let written = written + n;
                    self.state =
                        if written == LAST_CHUNK.len() { ChunkedState::End } else { ChunkedState::LastChunk(written) };
                    return Poll::Ready(Ok(PayloadItem::Chunk(n)));
                }

                ChunkedState::End => return Poll::Ready(Ok(PayloadItem::Eof)),
            }
        }
    }
}
