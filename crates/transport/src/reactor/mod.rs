//! The single task that drives every connection.
//!
//! [`Reactor::new`] returns the reactor future's owner and a cloneable
//! [`ReactorHandle`]. Sockets registered through the handle become
//! connections that the reactor polls as their socket, entity or message
//! queue wakes them; nothing in a connection ever blocks the task, blocking
//! entity reads go to the shared [`WorkerPool`].
//!
//! ```no_run
//! use micro_transport::config::TransportConfig;
//! use micro_transport::connection::Role;
//! use micro_transport::reactor::Reactor;
//! use tokio::net::TcpListener;
//!
//! # async fn serve() -> std::io::Result<()> {
//! let (reactor, handle) = Reactor::new(TransportConfig::default());
//! tokio::spawn(reactor.run());
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! let (stream, _) = listener.accept().await?;
//! let connection = handle.register(stream, Role::Server).expect("reactor is running");
//! # drop(connection);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info};
use triomphe::Arc;

use crate::channel::WorkerPool;
use crate::config::TransportConfig;
use crate::connection::{Connection, ConnectionHandle, Role, Socket};
use crate::protocol::TransportError;

type ConnectionTask = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// How a connection task ended.
struct Outcome {
    id: u64,
    result: Result<(), Arc<TransportError>>,
}

pub struct Reactor {
    registrations: mpsc::UnboundedReceiver<ConnectionTask>,
    connections: FuturesUnordered<ConnectionTask>,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    accepting: bool,
    closed: u64,
    failed: u64,
}

/// Registers sockets with a [`Reactor`] and shuts it down, from any thread.
#[derive(Clone)]
pub struct ReactorHandle {
    registrations: mpsc::UnboundedSender<ConnectionTask>,
    config: Arc<TransportConfig>,
    pool: WorkerPool,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl Reactor {
    pub fn new(config: TransportConfig) -> (Reactor, ReactorHandle) {
        let (tx, rx) = mpsc::unbounded();
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::new(config.blocking_workers(), config.blocking_read_size());

        let reactor = Reactor {
            registrations: rx,
            connections: FuturesUnordered::new(),
            shutdown: Box::pin(shutdown.clone().cancelled_owned()),
            accepting: true,
            closed: 0,
            failed: 0,
        };
        let handle = ReactorHandle {
            registrations: tx,
            config: Arc::new(config),
            pool,
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown,
        };
        (reactor, handle)
    }

    /// Number of live connections.
    pub fn connections(&self) -> usize {
        self.connections.len()
    }

    /// Drives the connections until the reactor is shut down, or every handle
    /// is dropped, and every connection has closed.
    pub async fn run(mut self) {
        info!("reactor started");
        futures::future::poll_fn(|cx| self.poll_run(cx)).await;
        info!(closed = self.closed, failed = self.failed, "reactor stopped");
    }

    fn poll_run(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.accepting && self.shutdown.as_mut().poll(cx).is_ready() {
            info!(connections = self.connections.len(), "reactor shutting down");
            self.accepting = false;
            self.registrations.close();
        }

        loop {
            match self.registrations.poll_next_unpin(cx) {
                Poll::Ready(Some(task)) => self.connections.push(task),
                Poll::Ready(None) => {
                    self.accepting = false;
                    break;
                }
                Poll::Pending => break,
            }
        }

        while let Poll::Ready(Some(outcome)) = self.connections.poll_next_unpin(cx) {
            match outcome.result {
                Ok(()) => {
                    self.closed += 1;
                    debug!(connection = outcome.id, "connection task finished");
                }
                Err(e) => {
                    self.failed += 1;
                    debug!(connection = outcome.id, cause = %e, "connection task failed");
                }
            }
        }

        if !self.accepting && self.connections.is_empty() {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}

impl ReactorHandle {
    /// Hands `socket` to the reactor as a new connection playing `role`.
    pub fn register<S: Socket>(&self, socket: S, role: Role) -> Result<ConnectionHandle, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::ReactorClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, handle) =
            Connection::new(id, socket, role, &self.config, self.pool.clone(), self.shutdown.child_token());

        let task: ConnectionTask = Box::pin(async move {
            let result = connection.await;
            Outcome { id, result }
        });
        if self.registrations.unbounded_send(task).is_err() {
            return Err(TransportError::ReactorClosed);
        }

        info!(connection = id, role = ?role, "connection registered");
        Ok(handle)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Closes every connection and stops the reactor once they are gone.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled() || self.registrations.is_closed()
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("connections", &self.connections.len())
            .field("accepting", &self.accepting)
            .field("closed", &self.closed)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
