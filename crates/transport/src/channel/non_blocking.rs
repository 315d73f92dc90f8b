use std::cmp;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

use crate::channel::{EntityChannel, sealed};
use crate::protocol::{BoxError, EntityChannelType};

/// Channel over sources that register their own readiness with the runtime.
pub struct NonBlockingChannel {
    source: Source,
}

enum Source {
    Reader(Pin<Box<dyn AsyncRead + Send>>),
    Body { body: UnsyncBoxBody<Bytes, BoxError>, pending: Bytes, done: bool },
}

impl NonBlockingChannel {
    pub fn reader(reader: Pin<Box<dyn AsyncRead + Send>>) -> Self {
        Self { source: Source::Reader(reader) }
    }

    pub fn body(body: UnsyncBoxBody<Bytes, BoxError>) -> Self {
        Self { source: Source::Body { body, pending: Bytes::new(), done: false } }
    }
}

impl sealed::Sealed for NonBlockingChannel {}

impl EntityChannel for NonBlockingChannel {
    fn channel_type(&self) -> EntityChannelType {
        EntityChannelType::NonBlocking
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<io::Result<usize>> {
        match &mut self.source {
            Source::Reader(reader) => {
                let mut read_buf = ReadBuf::new(dst);
                ready!(reader.as_mut().poll_read(cx, &mut read_buf))?;
                Poll::Ready(Ok(read_buf.filled().len()))
            }
            Source::Body { body, pending, done } => loop {
                if !pending.is_empty() {
                    let n = cmp::min(pending.len(), dst.len());
                    dst[..n].copy_from_slice(&pending[..n]);
                    pending.advance(n);
                    return Poll::Ready(Ok(n));
                }

                if *done {
                    return Poll::Ready(Ok(0));
                }

                match ready!(Pin::new(&mut *body).poll_frame(cx)) {
                    Some(Ok(frame)) => match frame.into_data() {
                        Ok(data) => *pending = data,
                        Err(_) => trace!("skip non data frame of entity body"),
                    },
                    Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                    None => *done = true,
                }
            },
        }
    }
}

impl fmt::Debug for NonBlockingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Reader(_) => "reader",
            Source::Body { .. } => "body",
        };
        f.debug_struct("NonBlockingChannel").field("source", &kind).finish()
    }
}
