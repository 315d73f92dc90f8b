//! Channels that drive the source of an outbound entity.
//!
//! The outbound way never reads an entity source directly. When the headers
//! of a message are done, the source is classified once into one of three
//! channels and stays with it until the message completes:
//!
//! - [`TransferableChannel`]: in-memory bytes and files, read inline
//! - [`BlockingChannel`]: blocking readers, read on the [`WorkerPool`]
//! - [`NonBlockingChannel`]: async readers and `http_body::Body`s, polled on the reactor task
//!
//! Every channel reports readiness the way futures do: `Poll::Pending` means
//! the waker in the context will be woken once bytes can be produced.

mod blocking;
mod non_blocking;
mod pool;
mod transferable;

use std::fmt;
use std::io;
use std::task::{Context, Poll};

pub use blocking::BlockingChannel;
pub use non_blocking::NonBlockingChannel;
pub use pool::WorkerPool;
pub use transferable::TransferableChannel;

use crate::protocol::{EntityChannelType, EntitySource};

mod sealed {
    pub trait Sealed {}
}

/// A source of entity bytes.
///
/// The set of implementations is closed, one per [`EntityChannelType`].
pub trait EntityChannel: sealed::Sealed + Send + fmt::Debug {
    fn channel_type(&self) -> EntityChannelType;

    /// Reads into `dst`, which is never empty.
    ///
    /// `Ok(0)` marks the end of the source.
    fn poll_read(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<io::Result<usize>>;
}

pub type BoxEntityChannel = Box<dyn EntityChannel>;

/// Opens the channel matching the source.
pub(crate) fn open(source: EntitySource, pool: &WorkerPool) -> BoxEntityChannel {
    match source {
        EntitySource::Memory(bytes) => Box::new(TransferableChannel::memory(bytes)),
        EntitySource::File(file) => Box::new(TransferableChannel::file(file)),
        EntitySource::Blocking(reader) => Box::new(BlockingChannel::new(reader, pool)),
        EntitySource::Reader(reader) => Box::new(NonBlockingChannel::reader(reader)),
        EntitySource::Body(body) => Box::new(NonBlockingChannel::body(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Entity;
    use bytes::Bytes;
    use http_body_util::Full;
    use std::io::Cursor;

    #[test]
    fn opens_the_channel_of_each_source() {
        let pool = WorkerPool::new(1, 64);

        let channel = open(Entity::from_bytes("abc").into_source(), &pool);
        assert_eq!(channel.channel_type(), EntityChannelType::Transferable);

        let channel = open(Entity::from_reader(Cursor::new(vec![1u8]), None).into_source(), &pool);
        assert_eq!(channel.channel_type(), EntityChannelType::Blocking);

        let channel = open(Entity::from_body(Full::new(Bytes::from_static(b"x"))).into_source(), &pool);
        assert_eq!(channel.channel_type(), EntityChannelType::NonBlocking);
    }
}
