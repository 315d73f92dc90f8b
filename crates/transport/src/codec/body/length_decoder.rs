//! Decoder for bodies sized by `Content-Length`.

use std::cmp;

use bytes::{Buf, BytesMut};

use crate::protocol::{ParseError, PayloadItem};

/// Takes exactly `length` bytes, leaving the rest of `src` for the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// bytes still to come
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    /// Appends the next bytes of the body to `dst`.
    ///
    /// Returns `Ok(None)` when `src` is exhausted before the body is.
    pub fn decode<B: Buf>(&mut self, src: &mut B, dst: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if !src.has_remaining() {
            return Ok(None);
        }

        let chunk = src.chunk();
        let len = usize::try_from(self.length).map_or(chunk.len(), |length| cmp::min(length, chunk.len()));
        dst.extend_from_slice(&chunk[..len]);
        src.advance(len);

        self.length -= len as u64;
        Ok(Some(PayloadItem::Chunk(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_basic() {
        let mut buffer = Bytes::from_static(b"101234567890abcdef\r\n\r\n");
        let mut body = BytesMut::new();

        let mut length_decoder = LengthDecoder::new(10);
        let item = length_decoder.decode(&mut buffer, &mut body).unwrap().unwrap();
        assert_eq!(item, PayloadItem::Chunk(10));

        assert_eq!(&body[..], b"1012345678");
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");

        let item = length_decoder.decode(&mut buffer, &mut body).unwrap().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn waits_for_more_bytes() {
        let mut body = BytesMut::new();
        let mut length_decoder = LengthDecoder::new(6);

        let mut first = Bytes::from_static(b"abc");
        assert_eq!(length_decoder.decode(&mut first, &mut body).unwrap(), Some(PayloadItem::Chunk(3)));
        assert_eq!(length_decoder.decode(&mut first, &mut body).unwrap(), None);

        let mut second = Bytes::from_static(b"defGET");
        assert_eq!(length_decoder.decode(&mut second, &mut body).unwrap(), Some(PayloadItem::Chunk(3)));
        assert_eq!(length_decoder.decode(&mut second, &mut body).unwrap(), Some(PayloadItem::Eof));

        assert_eq!(&body[..], b"abcdef");
        assert_eq!(&second[..], b"GET");
    }
}
