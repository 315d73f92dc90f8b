//! HTTP request header handling implementation.
//!
//! This module provides the core abstractions for handling HTTP request headers.
//! It wraps the standard `http::Request` type so the transport can carry a
//! request head without its body.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide:
/// - Access to standard HTTP header fields
/// - Conversion from different request formats
/// - Body attachment capabilities
/// - Request metadata inspection
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if this request is expected to carry a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// - GET
    /// - HEAD
    /// - DELETE
    /// - OPTIONS
    /// - CONNECT
    ///
    /// This only decides whether an empty body is announced with
    /// `Content-Length: 0`; inbound framing always follows the headers.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Returns the request-target written on the start line.
    ///
    /// `CONNECT` uses the authority form, every other method the origin form.
    pub fn request_target(&self) -> &str {
        let uri = self.uri();
        if self.method() == Method::CONNECT {
            if let Some(authority) = uri.authority() {
                return authority.as_str();
            }
        }

        match uri.path_and_query() {
            Some(path_and_query) if !path_and_query.as_str().is_empty() => path_and_query.as_str(),
            _ => "/",
        }
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_target_forms() {
        let header = RequestHeader::from(Request::get("http://example.com/index/?a=1&b=2").body(()).unwrap());
        assert_eq!(header.request_target(), "/index/?a=1&b=2");

        let header = RequestHeader::from(Request::get("http://example.com").body(()).unwrap());
        assert_eq!(header.request_target(), "/");

        let header = RequestHeader::from(Request::connect("example.com:443").body(()).unwrap());
        assert_eq!(header.request_target(), "example.com:443");
    }

    #[test]
    fn need_body_by_method() {
        assert!(!RequestHeader::from(Request::get("/").body(()).unwrap()).need_body());
        assert!(!RequestHeader::from(Request::head("/").body(()).unwrap()).need_body());
        assert!(RequestHeader::from(Request::post("/").body(()).unwrap()).need_body());
        assert!(RequestHeader::from(Request::put("/").body(()).unwrap()).need_body());
    }

    #[test]
    fn body_attachment_keeps_head() {
        let header = RequestHeader::from(Request::put("/a").header("x-id", "7").body(()).unwrap());
        let request = header.body("payload");

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.headers().get("x-id").unwrap(), "7");
        assert_eq!(*request.body(), "payload");
    }
}
