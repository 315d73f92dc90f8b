use std::io;

use http::Version;
use thiserror::Error;

/// Top level failure of a connection.
///
/// Framing and socket failures are fatal to the connection that produced them,
/// the reactor only logs them and keeps servicing the other connections.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("inbound error: {source}")]
    Inbound {
        #[from]
        source: ParseError,
    },

    #[error("outbound error: {source}")]
    Outbound {
        #[from]
        source: SendError,
    },

    #[error("connection closed")]
    Closed,

    #[error("reactor is not running")]
    ReactorClosed,

    #[error("connection idle timeout")]
    Timeout,
}

impl TransportError {
    /// Returns true if the error was caused by bytes that could not be framed.
    pub fn is_framing(&self) -> bool {
        match self {
            TransportError::Inbound { source } => !matches!(source, ParseError::Io { .. }),
            TransportError::Outbound { source } => !matches!(source, SendError::Io { .. }),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid start line: {reason}")]
    InvalidStartLine { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {version}")]
    InvalidVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("entity size exceed the limit {max_size}")]
    TooLargeEntity { max_size: u64 },

    #[error("unexpected end of stream while reading {position}")]
    UnexpectedEof { position: &'static str },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_start_line<S: ToString>(str: S) -> Self {
        Self::InvalidStartLine { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(str: S) -> Self {
        Self::InvalidVersion { version: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn too_large_entity(max_size: u64) -> Self {
        Self::TooLargeEntity { max_size }
    }

    pub fn unexpected_eof(position: &'static str) -> Self {
        Self::UnexpectedEof { position }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(Version),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_errors_are_told_apart_from_socket_errors() {
        let framing: TransportError = ParseError::invalid_header("BadHeaderNoColon").into();
        assert!(framing.is_framing());

        let socket: TransportError = ParseError::io(io::Error::from(io::ErrorKind::ConnectionReset)).into();
        assert!(!socket.is_framing());

        let short_body: TransportError = SendError::invalid_body("entity ended early").into();
        assert!(short_body.is_framing());

        assert!(!TransportError::Closed.is_framing());
    }
}
