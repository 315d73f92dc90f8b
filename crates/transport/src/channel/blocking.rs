use std::cmp;
use std::fmt;
use std::io;
use std::io::{ErrorKind, Read};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use tokio::task::JoinHandle;
use tokio_util::sync::PollSemaphore;
use tracing::trace;

use crate::channel::{EntityChannel, WorkerPool, sealed};
use crate::protocol::EntityChannelType;

type BoxRead = Box<dyn Read + Send>;

/// The reader goes into the job and comes back with what it read.
type ReadJob = JoinHandle<(BoxRead, io::Result<Vec<u8>>)>;

/// Channel over a blocking reader.
///
/// Each read runs as a job on the [`WorkerPool`]; the channel is pending until
/// the job hands its bytes back, and the reactor task is woken by the join handle.
pub struct BlockingChannel {
    reader: Option<BoxRead>,
    permits: PollSemaphore,
    read_size: usize,
    job: Option<ReadJob>,
    ready: Bytes,
    eof: bool,
}

impl BlockingChannel {
    pub fn new(reader: Box<dyn Read + Send>, pool: &WorkerPool) -> Self {
        Self {
            reader: Some(reader),
            permits: pool.poll_semaphore(),
            read_size: pool.read_size(),
            job: None,
            ready: Bytes::new(),
            eof: false,
        }
    }

    fn dispatch(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let Some(permit) = ready!(self.permits.poll_acquire(cx)) else {
            return Poll::Ready(Err(io::Error::other("worker pool is closed")));
        };
        let Some(mut reader) = self.reader.take() else {
            return Poll::Ready(Err(io::Error::other("blocking reader was lost by a failed job")));
        };

        let read_size = self.read_size;
        trace!(read_size, "dispatch blocking entity read");
        self.job = Some(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut buf = vec![0; read_size];
            let result = loop {
                match reader.read(&mut buf) {
                    Ok(n) => {
                        buf.truncate(n);
                        break Ok(buf);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => break Err(e),
                }
            };
            (reader, result)
        }));
        Poll::Ready(Ok(()))
    }
}

impl sealed::Sealed for BlockingChannel {}

impl EntityChannel for BlockingChannel {
    fn channel_type(&self) -> EntityChannelType {
        EntityChannelType::Blocking
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<io::Result<usize>> {
        loop {
            if !self.ready.is_empty() {
                let n = cmp::min(self.ready.len(), dst.len());
                dst[..n].copy_from_slice(&self.ready[..n]);
                self.ready.advance(n);
                return Poll::Ready(Ok(n));
            }

            if self.eof {
                return Poll::Ready(Ok(0));
            }

            let Some(job) = self.job.as_mut() else {
                ready!(self.dispatch(cx))?;
                continue;
            };

            let joined = ready!(Pin::new(job).poll(cx));
            self.job = None;

            let (reader, result) = joined.map_err(io::Error::other)?;
            self.reader = Some(reader);

            let bytes = result?;
            trace!(len = bytes.len(), "blocking entity read done");
            if bytes.is_empty() {
                self.eof = true;
            } else {
                self.ready = Bytes::from(bytes);
            }
        }
    }
}

impl fmt::Debug for BlockingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingChannel")
            .field("read_size", &self.read_size)
            .field("in_flight", &self.job.is_some())
            .field("ready", &self.ready.len())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}
