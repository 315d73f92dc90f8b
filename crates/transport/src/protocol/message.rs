use http::{HeaderMap, Request, Response, Version};

use crate::protocol::{Entity, RequestHeader, ResponseHead};

/// A HTTP message moved by a connection.
///
/// Outbound messages are built by the application and handed to a
/// [`MessageSender`](crate::connection::MessageSender); inbound messages are
/// produced by the inbound way once the whole body has been read.
#[derive(Debug)]
pub struct Message {
    head: MessageHead,
    entity: Option<Entity>,
}

/// The start line and headers of a [`Message`].
#[derive(Debug)]
pub enum MessageHead {
    Request(RequestHeader),
    Response(ResponseHead),
}

impl Message {
    pub fn new(head: MessageHead, entity: Option<Entity>) -> Self {
        Self { head, entity }
    }

    pub fn request(request: Request<()>) -> Self {
        Self::new(MessageHead::Request(request.into()), None)
    }

    pub fn response(response: Response<()>) -> Self {
        Self::new(MessageHead::Response(response), None)
    }

    /// Attaches a body to the message, replacing any previous one.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn head(&self) -> &MessageHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut MessageHead {
        &mut self.head
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        self.entity.as_mut()
    }

    pub fn take_entity(&mut self) -> Option<Entity> {
        self.entity.take()
    }

    pub fn into_parts(self) -> (MessageHead, Option<Entity>) {
        (self.head, self.entity)
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn is_request(&self) -> bool {
        matches!(self.head, MessageHead::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.head, MessageHead::Response(_))
    }

    /// Returns the request head, if this message is a request.
    pub fn as_request(&self) -> Option<&RequestHeader> {
        self.head.as_request()
    }

    /// Returns the response head, if this message is a response.
    pub fn as_response(&self) -> Option<&ResponseHead> {
        self.head.as_response()
    }
}

impl MessageHead {
    pub fn as_request(&self) -> Option<&RequestHeader> {
        match self {
            MessageHead::Request(header) => Some(header),
            MessageHead::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseHead> {
        match self {
            MessageHead::Request(_) => None,
            MessageHead::Response(head) => Some(head),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            MessageHead::Request(header) => header.headers(),
            MessageHead::Response(head) => head.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            MessageHead::Request(header) => header.as_mut().headers_mut(),
            MessageHead::Response(head) => head.headers_mut(),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            MessageHead::Request(header) => header.version(),
            MessageHead::Response(head) => head.version(),
        }
    }
}

impl From<Request<()>> for Message {
    fn from(request: Request<()>) -> Self {
        Message::request(request)
    }
}

impl From<Request<Entity>> for Message {
    fn from(request: Request<Entity>) -> Self {
        let (parts, entity) = request.into_parts();
        Message::new(MessageHead::Request(parts.into()), Some(entity))
    }
}

impl From<Response<()>> for Message {
    fn from(response: Response<()>) -> Self {
        Message::response(response)
    }
}

impl From<Response<Entity>> for Message {
    fn from(response: Response<Entity>) -> Self {
        let (parts, entity) = response.into_parts();
        Message::new(MessageHead::Response(Response::from_parts(parts, ())), Some(entity))
    }
}

/// Progress reported by body encoders and decoders.
///
/// The decoders append payload bytes to a caller owned buffer and the encoders
/// write framed bytes into the socket buffer, so a chunk only carries the
/// number of bytes produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadItem {
    /// `n` bytes were produced, `0` means the destination had no usable room
    Chunk(usize),
    /// Marks the end of the payload stream
    Eof,
}

impl PayloadItem {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item reports produced bytes
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

/// Represents the framing of an HTTP payload.
///
/// The framing of a message is decided once, when its headers are written or
/// parsed, and never changes afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Payload delimited by the peer closing the connection
    UntilClose,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Returns true if the end of the payload is signalled by closing the connection
    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}
