//! HTTP response header handling implementation.
//!
//! This module provides type definitions for HTTP response headers.
//! It uses the standard `http::Response` type with an empty body placeholder
//! to represent response headers; the body travels separately as an
//! [`Entity`](crate::protocol::Entity).

use http::{Method, Response, StatusCode};

/// Type alias for HTTP response headers.
///
/// This type represents the header portion of an HTTP response, using
/// `http::Response<()>` with an empty body placeholder.
pub type ResponseHead = Response<()>;

/// Determines if a response with this status to a request with this method
/// may carry a body at all.
///
/// Informational, `204 No Content` and `304 Not Modified` responses never do,
/// and neither does any reply to a `HEAD` request or a successful `CONNECT`.
pub(crate) fn response_allows_body(status: StatusCode, request_method: Option<&Method>) -> bool {
    if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return false;
    }

    match request_method {
        Some(&Method::HEAD) => false,
        Some(&Method::CONNECT) => !status.is_success(),
        _ => true,
    }
}
