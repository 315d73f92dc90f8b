//! The non-blocking socket a connection is driven over.
//!
//! Readiness comes from the runtime: `poll_*_ready` registers the task with
//! the socket's registration, and `try_*` moves bytes without waiting. A
//! `WouldBlock` from `try_*` clears the readiness again, so the next
//! `poll_*_ready` parks the task until the socket is ready.

use std::io;
use std::task::{Context, Poll};

use tokio::net::TcpStream;

pub trait Socket: Send + Unpin + 'static {
    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    fn poll_write_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Reads what is available, `Ok(0)` is the end of stream.
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl Socket for TcpStream {
    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        TcpStream::poll_read_ready(self, cx)
    }

    fn poll_write_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        TcpStream::poll_write_ready(self, cx)
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}

#[cfg(unix)]
impl Socket for tokio::net::UnixStream {
    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        tokio::net::UnixStream::poll_read_ready(self, cx)
    }

    fn poll_write_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        tokio::net::UnixStream::poll_write_ready(self, cx)
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_write(self, buf)
    }
}

#[cfg(test)]
pub(crate) use mock::MockSocket;

#[cfg(test)]
mod mock {
    use super::Socket;
    use std::collections::VecDeque;
    use std::io;
    use std::io::ErrorKind;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll, Waker};

    /// Scripted socket for driving ways and connections deterministically.
    ///
    /// Input is handed out one pushed segment at a time. Every write takes at
    /// most the next planned size, a planned `0` accepts nothing.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockSocket {
        inner: Arc<Mutex<Inner>>,
    }

    #[derive(Debug, Default)]
    struct Inner {
        input: VecDeque<Vec<u8>>,
        eof: bool,
        output: Vec<u8>,
        write_plan: VecDeque<usize>,
        write_blocked: bool,
        read_waker: Option<Waker>,
        write_waker: Option<Waker>,
    }

    impl MockSocket {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
            let mut inner = self.inner.lock().unwrap();
            f(&mut inner)
        }

        pub(crate) fn push_input(&self, bytes: impl AsRef<[u8]>) {
            self.with(|inner| {
                inner.input.push_back(bytes.as_ref().to_vec());
                if let Some(waker) = inner.read_waker.take() {
                    waker.wake();
                }
            });
        }

        pub(crate) fn close_input(&self) {
            self.with(|inner| {
                inner.eof = true;
                if let Some(waker) = inner.read_waker.take() {
                    waker.wake();
                }
            });
        }

        pub(crate) fn plan_writes(&self, sizes: impl IntoIterator<Item = usize>) {
            self.with(|inner| inner.write_plan.extend(sizes));
        }

        pub(crate) fn set_write_blocked(&self, blocked: bool) {
            self.with(|inner| {
                inner.write_blocked = blocked;
                if !blocked {
                    if let Some(waker) = inner.write_waker.take() {
                        waker.wake();
                    }
                }
            });
        }

        pub(crate) fn output(&self) -> Vec<u8> {
            self.with(|inner| inner.output.clone())
        }

        pub(crate) fn take_output(&self) -> Vec<u8> {
            self.with(|inner| std::mem::take(&mut inner.output))
        }
    }

    impl Socket for MockSocket {
        fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.with(|inner| {
                if inner.input.is_empty() && !inner.eof {
                    inner.read_waker = Some(cx.waker().clone());
                    Poll::Pending
                } else {
                    Poll::Ready(Ok(()))
                }
            })
        }

        fn poll_write_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.with(|inner| {
                if inner.write_blocked {
                    inner.write_waker = Some(cx.waker().clone());
                    Poll::Pending
                } else {
                    Poll::Ready(Ok(()))
                }
            })
        }

        fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.with(|inner| {
                let Some(segment) = inner.input.front_mut() else {
                    return if inner.eof { Ok(0) } else { Err(ErrorKind::WouldBlock.into()) };
                };
                let n = segment.len().min(buf.len());
                buf[..n].copy_from_slice(&segment[..n]);
                segment.drain(..n);
                if segment.is_empty() {
                    inner.input.pop_front();
                }
                Ok(n)
            })
        }

        fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
            self.with(|inner| {
                if inner.write_blocked {
                    return Err(ErrorKind::WouldBlock.into());
                }
                let n = match inner.write_plan.pop_front() {
                    Some(limit) => limit.min(buf.len()),
                    None => buf.len(),
                };
                inner.output.extend_from_slice(&buf[..n]);
                Ok(n)
            })
        }
    }
}
