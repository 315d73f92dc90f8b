//! Decoder for `Transfer-Encoding: chunked` bodies.
//!
//! The decoder works byte by byte through the size line, the chunk data and
//! its CRLF, and finally the last chunk with its optional trailer section, so
//! a chunk may be split across any number of reads.

use std::cmp;
use std::task::Poll;

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }

    /// Appends decoded chunk data to `dst`.
    ///
    /// - `Ok(Some(PayloadItem::Chunk(n)))` when `n` data bytes were appended
    /// - `Ok(Some(PayloadItem::Eof))` once the last chunk and trailers are consumed
    /// - `Ok(None)` when more data is needed
    pub fn decode<B: Buf>(&mut self, src: &mut B, dst: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if !src.has_remaining() {
                return Ok(None);
            }

            let mut read = 0;

            self.state = match self.state.step(src, &mut self.remaining_size, dst, &mut read) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if read > 0 {
                trace!(len = read, "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(read)));
            }
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the first hex digit of the chunk size
    Size,
    /// Read the remaining hex digits of the chunk size
    SizeDigits,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read optional trailer fields
    Trailer,
    /// Read LF after trailer
    TrailerLf,
    /// Read final CR
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.has_remaining() {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

type Step = Poll<Result<ChunkedState, ParseError>>;

impl ChunkedState {
    fn step<B: Buf>(&self, src: &mut B, remaining_size: &mut u64, dst: &mut BytesMut, read: &mut usize) -> Step {
        match self {
            Size => ChunkedState::read_size_start(src, remaining_size),
            SizeDigits => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, dst, read),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src),
            TrailerLf => ChunkedState::read_trailer_lf(src),
            EndCr => ChunkedState::read_end_cr(src),
            EndLf => ChunkedState::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size_start<B: Buf>(src: &mut B, size_per_chunk: &mut u64) -> Step {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            _ => return Poll::Ready(Err(ParseError::invalid_chunk("chunk size line without a size"))),
        };

        *size_per_chunk = u64::from(digit);
        Poll::Ready(Ok(SizeDigits))
    }

    fn read_size<B: Buf>(src: &mut B, size_per_chunk: &mut u64) -> Step {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line"))),
        };

        match size_per_chunk.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(size) => *size_per_chunk = size,
            None => return Poll::Ready(Err(ParseError::invalid_chunk("chunk size overflow"))),
        }

        Poll::Ready(Ok(SizeDigits))
    }

    fn read_size_lws<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size linear white space"))),
        }
    }

    fn read_extension<B: Buf>(src: &mut B) -> Step {
        // extensions are ignored up to the CRLF, a bare LF inside one is rejected
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf<B: Buf>(src: &mut B, size_per_chunk: u64) -> Step {
        match try_next_byte!(src) {
            b'\n' if size_per_chunk == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size LF"))),
        }
    }

    fn read_body<B: Buf>(src: &mut B, size_per_chunk: &mut u64, dst: &mut BytesMut, read: &mut usize) -> Step {
        if !src.has_remaining() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let chunk = src.chunk();
        let read_size = usize::try_from(*size_per_chunk).map_or(chunk.len(), |size| cmp::min(size, chunk.len()));
        dst.extend_from_slice(&chunk[..read_size]);
        src.advance(read_size);

        *size_per_chunk -= read_size as u64;
        *read = read_size;

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body CR"))),
        }
    }

    fn read_body_lf<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body LF"))),
        }
    }

    fn read_trailer<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid trailer end LF"))),
        }
    }

    fn read_end_cr<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf<B: Buf>(src: &mut B) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk end LF"))),
        }
    }
}
