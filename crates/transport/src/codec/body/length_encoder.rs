//! Encoder for entities of declared size, sent with `Content-Length`.

use std::cmp;
use std::task::{Context, Poll, ready};

use tracing::trace;

use crate::channel::BoxEntityChannel;
use crate::protocol::{EntityChannelType, PayloadItem, SendError};

/// Caps the entity stream at the declared size.
///
/// Once the declared number of bytes went out the encoder reports the end of
/// the payload without asking the channel again.
#[derive(Debug)]
pub struct LengthEncoder {
    channel: BoxEntityChannel,
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(channel: BoxEntityChannel, length: u64) -> Self {
        Self { channel, remaining: length }
    }

    pub fn channel_type(&self) -> EntityChannelType {
        self.channel.channel_type()
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0
    }

    pub fn poll_transfer(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<Result<PayloadItem, SendError>> {
        if self.remaining == 0 {
            return Poll::Ready(Ok(PayloadItem::Eof));
        }

        if dst.is_empty() {
            return Poll::Ready(Ok(PayloadItem::Chunk(0)));
        }

        let cap = usize::try_from(self.remaining).map_or(dst.len(), |remaining| cmp::min(remaining, dst.len()));
        let n = ready!(self.channel.poll_read(cx, &mut dst[..cap]))?;
        if n == 0 {
            return Poll::Ready(Err(SendError::invalid_body(format!(
                "entity ended {} bytes before its declared size",
                self.remaining
            ))));
        }

        self.remaining -= n as u64;
        trace!(len = n, remaining = self.remaining, "transfer sized entity bytes");
        Poll::Ready(Ok(PayloadItem::Chunk(n)))
    }
}
