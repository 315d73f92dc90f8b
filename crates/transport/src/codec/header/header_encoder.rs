//! Serializes the start line and header lines of outbound messages.
//!
//! The outbound way writes one line at a time into its line builder, so the
//! encoder works in two steps: the start line is written directly, and the
//! header lines are first materialized into an immutable [`HeaderSeries`]
//! that the way walks with its header index.

use std::io::Write;

use http::{HeaderName, HeaderValue, Version, header};
use mime::Mime;
use tracing::error;

use crate::codec::header::header_decoder::has_connection_token;
use crate::protocol::{Entity, MessageHead, PayloadSize, SendError, response_allows_body};

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
const CLOSE: HeaderValue = HeaderValue::from_static("close");
const KEEP_ALIVE: HeaderValue = HeaderValue::from_static("keep-alive");
const ZERO: HeaderValue = HeaderValue::from_static("0");

/// The ordered header lines of one outbound message.
///
/// Built once when the message enters the header phase and never changed.
#[derive(Debug, Clone, Default)]
pub struct HeaderSeries {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSeries {
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&HeaderName, &HeaderValue)> {
        self.headers.get(index).map(|(name, value)| (name, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(name, value)| (name, value))
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.headers.iter().any(|(n, _)| n == name)
    }

    fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }
}

#[derive(Debug)]
pub struct HeaderEncoder;

impl HeaderEncoder {
    /// Chooses the framing of an outbound message.
    ///
    /// An entity of unknown size is chunked, except for responses to HTTP/1.0
    /// peers which get the raw bytes and a closed connection instead.
    pub fn payload_size(head: &MessageHead, entity: Option<&Entity>) -> PayloadSize {
        if let MessageHead::Response(response) = head {
            if !response_allows_body(response.status(), None) {
                return PayloadSize::Empty;
            }
        }

        let Some(entity) = entity else {
            return PayloadSize::Empty;
        };

        match entity.size() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => match head {
                MessageHead::Response(response) if response.version() == Version::HTTP_10 => PayloadSize::UntilClose,
                _ => PayloadSize::Chunked,
            },
        }
    }

    /// Returns true if the connection can't be reused once `head` went out with `payload_size`.
    pub fn closes_connection(head: &MessageHead, payload_size: PayloadSize) -> bool {
        payload_size.is_until_close() || has_connection_token(head.headers(), "close")
    }

    /// Writes the start line including its CRLF.
    pub fn encode_start_line<W: Write>(head: &MessageHead, dst: &mut W) -> Result<(), SendError> {
        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        };

        match head {
            MessageHead::Request(request) => {
                write!(dst, "{} {} {}\r\n", request.method(), request.request_target(), version)?;
            }
            MessageHead::Response(response) => {
                let status = response.status();
                write!(dst, "{} {} {}\r\n", version, status.as_str(), status.canonical_reason().unwrap_or(""))?;
            }
        }
        Ok(())
    }

    /// Writes a single `name: value` line including its CRLF.
    pub fn encode_header<W: Write>(name: &HeaderName, value: &HeaderValue, dst: &mut W) -> Result<(), SendError> {
        dst.write_all(name.as_ref())?;
        dst.write_all(b": ")?;
        dst.write_all(value.as_bytes())?;
        dst.write_all(b"\r\n")?;
        Ok(())
    }

    /// Materializes the header lines written for `head`.
    ///
    /// Framing headers set by the application are replaced by the ones that
    /// match `payload_size`, and the `Connection` header is made to agree with
    /// `persistent`.
    pub fn header_series(
        head: &MessageHead,
        payload_size: PayloadSize,
        content_type: Option<&Mime>,
        persistent: bool,
    ) -> HeaderSeries {
        let headers = head.headers();
        let mut series = HeaderSeries { headers: Vec::with_capacity(headers.len() + 3) };

        if let MessageHead::Request(request) = head {
            if !headers.contains_key(header::HOST) {
                if let Some(host) = request.uri().authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()) {
                    series.push(header::HOST, host);
                }
            }
        }

        for (name, value) in headers {
            if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
                continue;
            }
            if name == header::CONNECTION && !persistent {
                continue;
            }
            series.push(name.clone(), value.clone());
        }

        if !persistent {
            series.push(header::CONNECTION, CLOSE);
        } else if head.version() == Version::HTTP_10 && !has_connection_token(headers, "keep-alive") {
            series.push(header::CONNECTION, KEEP_ALIVE);
        }

        if let Some(mime) = content_type {
            if !headers.contains_key(header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
                    series.push(header::CONTENT_TYPE, value);
                }
            }
        }

        match payload_size {
            PayloadSize::Length(n) => series.push(header::CONTENT_LENGTH, n.into()),
            PayloadSize::Chunked => series.push(header::TRANSFER_ENCODING, CHUNKED),
            PayloadSize::Empty if Self::announces_empty_body(head) => series.push(header::CONTENT_LENGTH, ZERO),
            PayloadSize::Empty | PayloadSize::UntilClose => {}
        }

        series
    }

    fn announces_empty_body(head: &MessageHead) -> bool {
        match head {
            MessageHead::Request(request) => request.need_body(),
            MessageHead::Response(response) => response_allows_body(response.status(), None),
        }
    }
}
