//! Message bodies and the sources they are read from.
//!
//! An [`Entity`] is the body of a [`Message`](crate::protocol::Message). It
//! remembers where its bytes come from and whether its size is known; the
//! outbound way uses both to pick the framing and the channel that drives the
//! source (see [`EntityChannelType`]).

use std::fmt;
use std::fs::File;
use std::io;
use std::io::Read;
use std::pin::Pin;

use bytes::Bytes;
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use mime::Mime;
use tokio::io::AsyncRead;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How the channel behind an entity has to be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChannelType {
    /// File like sources that can be read inline on the reactor task
    Transferable,
    /// Sources whose reads may block, driven on the worker pool
    Blocking,
    /// Sources that register their own readiness with the runtime
    NonBlocking,
}

pub(crate) enum EntitySource {
    Memory(Bytes),
    File(File),
    Blocking(Box<dyn Read + Send>),
    Reader(Pin<Box<dyn AsyncRead + Send>>),
    Body(UnsyncBoxBody<Bytes, BoxError>),
}

/// The body of a message.
pub struct Entity {
    source: EntitySource,
    size: Option<u64>,
    content_type: Option<Mime>,
}

impl Entity {
    fn new(source: EntitySource, size: Option<u64>) -> Self {
        Self { source, size, content_type: None }
    }

    /// An in-memory body of known size.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::new(EntitySource::Memory(bytes), Some(size))
    }

    /// A file body, sized from the file metadata.
    pub fn from_file(file: File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self::new(EntitySource::File(file), Some(size)))
    }

    /// A body read through blocking reads, which are moved off the reactor.
    ///
    /// With `size == None` the body is sent chunked.
    pub fn from_reader<R>(reader: R, size: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(EntitySource::Blocking(Box::new(reader)), size)
    }

    /// A body read from a non-blocking reader polled on the reactor task.
    pub fn from_async_reader<R>(reader: R, size: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(EntitySource::Reader(Box::pin(reader)), size)
    }

    /// A body from any `http_body::Body`, sized by its exact size hint.
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let size = body.size_hint().exact();
        Self::new(EntitySource::Body(body.map_err(Into::into).boxed_unsync()), size)
    }

    pub fn with_content_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn set_content_type(&mut self, content_type: Option<Mime>) {
        self.content_type = content_type;
    }

    /// The declared size, `None` if unknown until the source ends.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Returns true if there are bytes to send, an entity declared empty is not.
    pub fn is_available(&self) -> bool {
        self.size != Some(0)
    }

    pub fn channel_type(&self) -> EntityChannelType {
        match &self.source {
            EntitySource::Memory(_) | EntitySource::File(_) => EntityChannelType::Transferable,
            EntitySource::Blocking(_) => EntityChannelType::Blocking,
            EntitySource::Reader(_) | EntitySource::Body(_) => EntityChannelType::NonBlocking,
        }
    }

    /// The bytes of an in-memory body, which is what every inbound message carries.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.source {
            EntitySource::Memory(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self.source {
            EntitySource::Memory(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub(crate) fn into_source(self) -> EntitySource {
        self.source
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("channel_type", &self.channel_type())
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl From<Bytes> for Entity {
    fn from(bytes: Bytes) -> Self {
        Entity::from_bytes(bytes)
    }
}

impl From<String> for Entity {
    fn from(str: String) -> Self {
        Entity::from_bytes(str)
    }
}

impl From<&'static str> for Entity {
    fn from(str: &'static str) -> Self {
        Entity::from_bytes(str)
    }
}
