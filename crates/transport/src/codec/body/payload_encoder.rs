//! Frames an outbound entity according to the payload size chosen for its message.

use std::task::{Context, Poll, ready};

use tracing::trace;

use crate::channel::BoxEntityChannel;
use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{EntityChannelType, PayloadItem, PayloadSize, SendError};

#[derive(Debug)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// raw bytes, the end is signalled by closing the connection
    UntilClose { channel: BoxEntityChannel, eof: bool },

    /// have no body with the message
    NoBody,
}

impl PayloadEncoder {
    /// Wraps `channel` in the framing of `size`, an `Empty` payload drops the channel.
    pub fn new(size: PayloadSize, channel: BoxEntityChannel) -> Self {
        match size {
            PayloadSize::Length(length) => Self::fix_length(channel, length),
            PayloadSize::Chunked => Self::chunked(channel),
            PayloadSize::UntilClose => Self { kind: Kind::UntilClose { channel, eof: false } },
            PayloadSize::Empty => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked(channel: BoxEntityChannel) -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new(channel)) }
    }

    pub fn fix_length(channel: BoxEntityChannel, length: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(channel, length)) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::UntilClose { eof, .. } => *eof,
            Kind::NoBody => true,
        }
    }

    /// The type of the channel behind the payload, `None` without a body.
    pub fn channel_type(&self) -> Option<EntityChannelType> {
        match &self.kind {
            Kind::Length(encoder) => Some(encoder.channel_type()),
            Kind::Chunked(encoder) => Some(encoder.channel_type()),
            Kind::UntilClose { channel, .. } => Some(channel.channel_type()),
            Kind::NoBody => None,
        }
    }

    /// Writes framed entity bytes into `dst`.
    ///
    /// `Chunk(n)` reports the bytes written, `Eof` the end of the payload and
    /// `Pending` a channel that will wake the task once it can produce more.
    pub fn poll_transfer(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<Result<PayloadItem, SendError>> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.poll_transfer(cx, dst),
            Kind::Chunked(encoder) => encoder.poll_transfer(cx, dst),
            Kind::UntilClose { channel, eof } => {
                if *eof {
                    return Poll::Ready(Ok(PayloadItem::Eof));
                }
                if dst.is_empty() {
                    return Poll::Ready(Ok(PayloadItem::Chunk(0)));
                }
                let n = ready!(channel.poll_read(cx, dst))?;
                if n == 0 {
                    *eof = true;
                    return Poll::Ready(Ok(PayloadItem::Eof));
                }
                trace!(len = n, "transfer close delimited entity bytes");
                Poll::Ready(Ok(PayloadItem::Chunk(n)))
            }
            Kind::NoBody => Poll::Ready(Ok(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransferableChannel;
    use bytes::Bytes;
    use futures::task::noop_waker_ref;

    fn channel(bytes: &'static [u8]) -> BoxEntityChannel {
        Box::new(TransferableChannel::memory(Bytes::from_static(bytes)))
    }

    fn encode_all(mut encoder: PayloadEncoder) -> Vec<u8> {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut dst = [0u8; 32];
        let mut out = Vec::new();
        loop {
            match encoder.poll_transfer(&mut cx, &mut dst) {
                Poll::Ready(Ok(PayloadItem::Chunk(n))) => out.extend_from_slice(&dst[..n]),
                Poll::Ready(Ok(PayloadItem::Eof)) => {
                    assert!(encoder.is_finish());
                    return out;
                }
                other => panic!("unexpected poll result: {:?}", other),
            }
        }
    }

    #[test]
    fn frames_by_payload_size() {
        assert_eq!(encode_all(PayloadEncoder::new(PayloadSize::Length(3), channel(b"abc"))), b"abc");
        assert_eq!(encode_all(PayloadEncoder::new(PayloadSize::Chunked, channel(b"abc"))), b"3\r\nabc\r\n0\r\n\r\n");
        assert_eq!(encode_all(PayloadEncoder::new(PayloadSize::UntilClose, channel(b"abc"))), b"abc");
        assert_eq!(encode_all(PayloadEncoder::new(PayloadSize::Empty, channel(b"abc"))), b"");
    }

    #[test]
    fn reports_the_channel_type() {
        let encoder = PayloadEncoder::chunked(channel(b"abc"));
        assert!(encoder.is_chunked());
        assert_eq!(encoder.channel_type(), Some(EntityChannelType::Transferable));
        assert_eq!(PayloadEncoder::empty().channel_type(), None);
    }
}
