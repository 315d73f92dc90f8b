//! Parses the head of inbound messages.
//!
//! The inbound way collects the start line and the header lines one at a time
//! through its line builder, counting them against `max_header_bytes` with
//! [`HeaderDecoder::account`]. Once the blank line arrives the whole head is
//! parsed in one go by `httparse`, and [`parse_payload`] decides the
//! [`PayloadSize`] of the body.
//!
//! # Limits
//!
//! - the start line plus all header lines may not exceed `max_header_bytes`
//! - at most `max_header_num` header lines
//!
//! Header values are sliced out of the head bytes without copying.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version, header};
use httparse::Status;
use tracing::trace;

use crate::ensure;
use crate::protocol::{MessageHead, ParseError, PayloadSize, RequestHeader, response_allows_body};

#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
    max_header_num: usize,
    header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize, max_header_num: usize) -> Self {
        Self { max_header_bytes, max_header_num, header_bytes: 0 }
    }

    /// Forgets the count of the previous message.
    pub fn reset(&mut self) {
        self.header_bytes = 0;
    }

    /// Counts `raw_len` bytes, terminator included, against the header limit.
    pub fn account(&mut self, raw_len: usize) -> Result<(), ParseError> {
        self.header_bytes += raw_len;
        ensure!(
            self.header_bytes <= self.max_header_bytes,
            ParseError::too_large_header(self.header_bytes, self.max_header_bytes)
        );
        Ok(())
    }

    /// Parses a complete request head, from the request line to the blank line.
    pub fn decode_request(&self, src: Bytes) -> Result<MessageHead, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_header_num];
        let mut req = httparse::Request::new(&mut headers);

        let Status::Complete(head_len) = req.parse(&src).map_err(|e| self.parse_error(e))? else {
            return Err(ParseError::invalid_start_line("incomplete request head"));
        };
        trace!(head_size = head_len, header_num = req.headers.len(), "parsed request head");

        let version = parse_version(req.version)?;
        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
        let uri = req.path.ok_or(ParseError::InvalidUri)?;
        let uri = Uri::try_from(uri).map_err(|_| ParseError::InvalidUri)?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        append_headers(&src, req.headers, request.headers_mut())?;

        trace!(method = %request.method(), uri = %request.uri(), "parsed request line");
        Ok(MessageHead::Request(RequestHeader::from(request)))
    }

    /// Parses a complete response head, from the status line to the blank line.
    ///
    /// The reason phrase is not kept, the status code carries the meaning.
    pub fn decode_response(&self, src: Bytes) -> Result<MessageHead, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_header_num];
        let mut resp = httparse::Response::new(&mut headers);

        let Status::Complete(head_len) = resp.parse(&src).map_err(|e| self.parse_error(e))? else {
            return Err(ParseError::invalid_start_line("incomplete response head"));
        };
        trace!(head_size = head_len, header_num = resp.headers.len(), "parsed response head");

        let version = parse_version(resp.version)?;
        let status = resp.code.ok_or(ParseError::InvalidStatus)?;
        let status = StatusCode::from_u16(status).map_err(|_| ParseError::InvalidStatus)?;

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.version_mut() = version;
        append_headers(&src, resp.headers, response.headers_mut())?;

        trace!(status = status.as_u16(), "parsed status line");
        Ok(MessageHead::Response(response))
    }

    fn parse_error(&self, e: httparse::Error) -> ParseError {
        match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(self.max_header_num),
            httparse::Error::Version => ParseError::invalid_version(e),
            httparse::Error::Status => ParseError::InvalidStatus,
            httparse::Error::Token => ParseError::invalid_start_line(e),
            e => ParseError::invalid_header(e),
        }
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(1) => Ok(Version::HTTP_11),
        Some(0) => Ok(Version::HTTP_10),
        // Currently HTTP/2 and HTTP/3 not supported
        v => Err(ParseError::invalid_version(format!("{v:?}"))),
    }
}

/// Appends the parsed header fields to `headers`, values shared with `src`.
fn append_headers(src: &Bytes, parsed: &[httparse::Header<'_>], headers: &mut HeaderMap) -> Result<(), ParseError> {
    headers.reserve(parsed.len());
    for field in parsed {
        let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_maybe_shared(src.slice_ref(field.value.trim_ascii()))
            .map_err(ParseError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(())
}

/// Determines the framing of an inbound body from its headers.
///
/// `request_method` is the method of the request a response answers, it is
/// `None` when `head` is a request.
///
/// Refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
pub fn parse_payload(head: &MessageHead, request_method: Option<&Method>) -> Result<PayloadSize, ParseError> {
    if let MessageHead::Response(response) = head {
        if !response_allows_body(response.status(), request_method) {
            return Ok(PayloadSize::Empty);
        }
    }

    let headers = head.headers();
    let te_header = headers.get(header::TRANSFER_ENCODING);
    let has_cl = headers.contains_key(header::CONTENT_LENGTH);

    match (te_header, has_cl) {
        (Some(_), true) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }

        (te_value @ Some(_), false) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else if head_is_request(head) {
                Err(ParseError::invalid_header("transfer-encoding of request doesn't end with chunked"))
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, true) => parse_content_length(headers).map(|length| match length {
            0 => PayloadSize::Empty,
            n => PayloadSize::Length(n),
        }),

        (None, false) if head_is_request(head) => Ok(PayloadSize::Empty),

        (None, false) => Ok(PayloadSize::UntilClose),
    }
}

fn head_is_request(head: &MessageHead) -> bool {
    matches!(head, MessageHead::Request(_))
}

/// Parses `Content-Length`, repeated values must all agree.
fn parse_content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let cl_str = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        for item in cl_str.split(',') {
            let item = item.trim();
            ensure!(
                !item.is_empty() && item.bytes().all(|b| b.is_ascii_digit()),
                ParseError::invalid_content_length(format!("value {cl_str} is not u64"))
            );
            let parsed = item
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_content_length("conflicting content-length values"));
                }
                _ => length = Some(parsed),
            }
        }
    }
    length.ok_or_else(|| ParseError::invalid_content_length("empty content-length"))
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// Chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
        }
    }
    false
}

/// Returns true if any `Connection` header lists `token`.
pub(crate) fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// Returns true if the connection may carry another message after `head`.
///
/// HTTP/1.1 keeps the connection unless told `close`, HTTP/1.0 only keeps it
/// when asked for `keep-alive`.
pub fn is_keep_alive(head: &MessageHead) -> bool {
    let headers = head.headers();
    if has_connection_token(headers, "close") {
        return false;
    }
    match head.version() {
        Version::HTTP_11 => true,
        _ => has_connection_token(headers, "keep-alive"),
    }
}
