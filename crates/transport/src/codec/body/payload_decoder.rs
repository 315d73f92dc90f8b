//! Decoder for inbound message bodies.
//!
//! The framing is chosen from the parsed headers:
//! - `Content-Length` bodies, see [`LengthDecoder`]
//! - `Transfer-Encoding: chunked` bodies, see [`ChunkedDecoder`]
//! - bodies delimited by the peer closing the connection
//! - messages without a body

use bytes::{Buf, BytesMut};

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Take everything until the peer closes, `true` once it did
    UntilClose(bool),

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    pub fn new(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(length) => Self::fix_length(length),
            PayloadSize::Chunked => Self::chunked(),
            PayloadSize::UntilClose => Self::until_close(),
            PayloadSize::Empty => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(false) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose(_))
    }

    /// Appends the next body bytes from `src` to `dst`.
    ///
    /// `Ok(None)` asks for more input.
    pub fn decode<B: Buf>(&mut self, src: &mut B, dst: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src, dst),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src, dst),
            Kind::UntilClose(true) => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose(false) => {
                if !src.has_remaining() {
                    return Ok(None);
                }
                let chunk = src.chunk();
                let len = chunk.len();
                dst.extend_from_slice(chunk);
                src.advance(len);
                Ok(Some(PayloadItem::Chunk(len)))
            }
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    /// Tells the decoder the peer closed the connection.
    ///
    /// Only a close delimited body ends this way, for every other framing the
    /// body is cut short.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        match &mut self.kind {
            Kind::UntilClose(closed) => {
                *closed = true;
                Ok(())
            }
            Kind::NoBody => Ok(()),
            Kind::Length(_) | Kind::Chunked(_) => Err(ParseError::unexpected_eof("entity")),
        }
    }
}
