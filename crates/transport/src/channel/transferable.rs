use std::cmp;
use std::fs::File;
use std::io;
use std::io::{ErrorKind, Read};
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};

use crate::channel::{EntityChannel, sealed};
use crate::protocol::EntityChannelType;

/// Channel over sources that can be read without waiting on anything but the page cache.
#[derive(Debug)]
pub struct TransferableChannel {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Memory(Bytes),
    File(File),
}

impl TransferableChannel {
    pub fn memory(bytes: Bytes) -> Self {
        Self { source: Source::Memory(bytes) }
    }

    pub fn file(file: File) -> Self {
        Self { source: Source::File(file) }
    }
}

impl sealed::Sealed for TransferableChannel {}

impl EntityChannel for TransferableChannel {
    fn channel_type(&self) -> EntityChannelType {
        EntityChannelType::Transferable
    }

    fn poll_read(&mut self, _cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<io::Result<usize>> {
        match &mut self.source {
            Source::Memory(bytes) => {
                let n = cmp::min(bytes.len(), dst.len());
                dst[..n].copy_from_slice(&bytes[..n]);
                bytes.advance(n);
                Poll::Ready(Ok(n))
            }
            Source::File(file) => loop {
                match file.read(dst) {
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    result => return Poll::Ready(result),
                }
            },
        }
    }
}
