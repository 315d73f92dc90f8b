//! One socket, its two ways and the rules for when it closes.
//!
//! A [`Connection`] is a future owned by the reactor. Each poll is a pump:
//! newly enqueued messages go to the outbound way, the outbound way is
//! selected when the socket is writable or its entity can go on, the inbound
//! way is selected when the socket is readable, and parsed messages are handed
//! to the application. The pump repeats while something moved, up to
//! [`PUMP_BUDGET`] rounds per poll.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use futures::channel::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, error, info, trace};
use triomphe::Arc;

use crate::channel::WorkerPool;
use crate::config::TransportConfig;
use crate::connection::handle::{self, Envelope, Incoming};
use crate::connection::{ConnectionHandle, Delivery, Role, Socket};
use crate::protocol::{Message, ParseError, SendError, TransportError};
use crate::way::{InboundWay, IoState, OutboundWay, WayInterest};

/// Pump rounds per poll before the connection yields to the others.
pub const PUMP_BUDGET: usize = 32;

/// Selections of the outbound way per pump round.
const WRITE_ROUNDS: usize = 16;

pub(crate) struct Connection<S> {
    id: u64,
    socket: S,
    role: Role,
    persistent: bool,
    inbound: InboundWay,
    outbound: OutboundWay,
    outgoing: mpsc::UnboundedReceiver<Envelope>,
    outgoing_closed: bool,
    incoming: mpsc::UnboundedSender<Incoming>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    idle_timeout: Option<Duration>,
    idle: Option<Pin<Box<Sleep>>>,
}

/// What a pump round did.
#[derive(Debug, Default)]
struct Round {
    /// bytes or messages moved
    progress: bool,
    /// a way stopped on its own budget and can go on at once
    more: bool,
}

impl<S: Socket> Connection<S> {
    pub(crate) fn new(
        id: u64,
        socket: S,
        role: Role,
        config: &TransportConfig,
        pool: WorkerPool,
        token: CancellationToken,
    ) -> (Self, ConnectionHandle) {
        let (handle, outgoing, incoming) = handle::channel(id, token.clone());

        let connection = Self {
            id,
            socket,
            role,
            persistent: true,
            inbound: InboundWay::new(config, role),
            outbound: OutboundWay::new(config.buffer_capacity(), pool),
            outgoing,
            outgoing_closed: false,
            incoming,
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            idle_timeout: config.idle_timeout(),
            idle: None,
        };
        (connection, handle)
    }

    fn poll_pump(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Arc<TransportError>>> {
        for _ in 0..PUMP_BUDGET {
            if self.cancelled.as_mut().poll(cx).is_ready() {
                self.close("close requested");
                return Poll::Ready(Ok(()));
            }

            let round = match self.round(cx) {
                Ok(round) => round,
                Err(e) => return Poll::Ready(Err(self.fail(e))),
            };

            if let Some(reason) = self.close_reason() {
                self.close(reason);
                return Poll::Ready(Ok(()));
            }

            if round.progress {
                self.touch();
            }

            if !round.progress && !round.more {
                if self.poll_idle(cx).is_ready() {
                    return Poll::Ready(Err(self.fail(TransportError::Timeout)));
                }
                return Poll::Pending;
            }
        }

        trace!(connection = self.id, "pump budget exhausted, yielding");
        cx.waker().wake_by_ref();
        Poll::Pending
    }

    fn round(&mut self, cx: &mut Context<'_>) -> Result<Round, TransportError> {
        let mut round = Round::default();
        let read = self.inbound.read();
        let written = self.outbound.written();

        while !self.outgoing_closed {
            match self.outgoing.poll_next_unpin(cx) {
                Poll::Ready(Some((message, receipt))) => {
                    self.accept(message, receipt);
                    round.progress = true;
                }
                Poll::Ready(None) => {
                    debug!(connection = self.id, "application dropped its sender");
                    self.outgoing_closed = true;
                }
                Poll::Pending => break,
            }
        }

        round.more |= self.select_outbound(cx)?;
        round.more |= self.select_inbound(cx)?;

        while let Some(message) = self.inbound.pop_message() {
            if self.role == Role::Server {
                if let Some(request) = message.as_request() {
                    self.outbound.record_request(request.method().clone());
                }
            }
            self.deliver(message);
            round.progress = true;
        }

        if let Some(last) = self.inbound.final_message() {
            self.outbound.close_after_message(last);
        }
        if self.persistent && self.outbound.close_after() {
            debug!(connection = self.id, "connection is no longer persistent");
            self.persistent = false;
        }

        round.progress |= self.inbound.read() != read || self.outbound.written() != written;
        Ok(round)
    }

    fn accept(&mut self, message: Message, receipt: oneshot::Sender<Delivery>) {
        if self.role == Role::Client {
            if let Some(request) = message.as_request() {
                self.inbound.expect_response(request.method().clone());
            }
        }
        trace!(connection = self.id, queued = self.outbound.queued() + 1, "outbound message enqueued");
        self.outbound.enqueue(message, Some(receipt));
    }

    /// Returns true if the way stopped with more to do right away.
    fn select_outbound(&mut self, cx: &mut Context<'_>) -> Result<bool, TransportError> {
        for _ in 0..WRITE_ROUNDS {
            if self.outbound.is_idle() {
                return Ok(false);
            }

            if self.outbound.io_state() == IoState::Interest && self.outbound.interest() == WayInterest::Socket {
                match self.socket.poll_write_ready(cx) {
                    Poll::Ready(Ok(())) => {}
                    Poll::Ready(Err(e)) => return Err(SendError::io(e).into()),
                    Poll::Pending => return Ok(false),
                }
            }

            self.outbound.on_selected(&self.socket, cx)?;

            // a socket interest is polled again so the task is registered for it
            if self.outbound.interest() != WayInterest::Socket {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns true if the way stopped with more to do right away.
    fn select_inbound(&mut self, cx: &mut Context<'_>) -> Result<bool, TransportError> {
        while !self.inbound.is_finished() {
            match self.socket.poll_read_ready(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Err(ParseError::io(e).into()),
                Poll::Pending => return Ok(false),
            }

            self.inbound.on_selected(&self.socket)?;

            match self.inbound.io_state() {
                IoState::Interest => {}
                IoState::Processing => return Ok(true),
                IoState::Idle => return Ok(false),
            }
        }
        Ok(false)
    }

    fn deliver(&mut self, message: Message) {
        if self.incoming.unbounded_send(Ok(message)).is_err() {
            trace!(connection = self.id, "receiver dropped, inbound message dropped");
        }
    }

    fn close_reason(&self) -> Option<&'static str> {
        let answered = match self.role {
            Role::Server => self.outbound.completed() >= self.inbound.completed(),
            Role::Client => self.inbound.completed() >= self.outbound.completed(),
        };
        let between_messages = self.inbound.is_between_messages() && self.outbound.is_between_messages();

        if !self.persistent && answered && between_messages {
            return Some("not persistent");
        }

        if self.inbound.is_eof() && self.outbound.is_idle() && (self.role == Role::Client || answered) {
            return Some("peer closed");
        }

        if self.outgoing_closed
            && self.outbound.is_idle()
            && self.inbound.is_between_messages()
            && (self.role == Role::Server || answered)
        {
            return Some("application closed");
        }

        None
    }

    fn close(&mut self, reason: &'static str) {
        info!(
            connection = self.id,
            reason,
            received = self.inbound.completed(),
            sent = self.outbound.completed(),
            "connection closed"
        );
        self.outbound.discard();
        self.refuse_outgoing(&Delivery::Discarded);
        self.incoming.close_channel();
        self.token.cancel();
    }

    fn fail(&mut self, error: TransportError) -> Arc<TransportError> {
        let error = Arc::new(error);
        error!(connection = self.id, cause = %error, "connection failed");

        while let Some(message) = self.inbound.pop_message() {
            self.deliver(message);
        }
        // the receiver may be gone already
        let _ = self.incoming.unbounded_send(Err(Arc::clone(&error)));

        self.outbound.fail(&error);
        self.refuse_outgoing(&Delivery::Failed(Arc::clone(&error)));
        self.incoming.close_channel();
        self.token.cancel();
        error
    }

    /// Stops accepting messages and settles the ones still in the channel.
    ///
    /// Must run before the receiver ends: enqueuing fails at once from then on.
    fn refuse_outgoing(&mut self, delivery: &Delivery) {
        self.outgoing.close();
        while let Some(Some((_, receipt))) = self.outgoing.next().now_or_never() {
            let _ = receipt.send(delivery.clone());
        }
        self.outgoing_closed = true;
    }

    fn touch(&mut self) {
        if let (Some(timeout), Some(idle)) = (self.idle_timeout, self.idle.as_mut()) {
            idle.as_mut().reset(Instant::now() + timeout);
        }
    }

    fn poll_idle(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(timeout) = self.idle_timeout else {
            return Poll::Pending;
        };
        // created on first use, a timer needs the runtime of the reactor task
        let idle = self.idle.get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
        idle.as_mut().poll(cx)
    }
}

impl<S: Socket> Future for Connection<S> {
    type Output = Result<(), Arc<TransportError>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().poll_pump(cx)
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("persistent", &self.persistent)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockSocket;
    use crate::protocol::Entity;
    use futures::task::noop_waker_ref;
    use http::{Method, Request, Response, StatusCode};

    fn connection(role: Role) -> (Connection<MockSocket>, ConnectionHandle, MockSocket) {
        let socket = MockSocket::new();
        let config = TransportConfig::builder().buffer_capacity(64).build().unwrap();
        let (connection, handle) =
            Connection::new(1, socket.clone(), role, &config, WorkerPool::new(1, 64), CancellationToken::new());
        (connection, handle, socket)
    }

    fn poll(connection: &mut Connection<MockSocket>) -> Poll<Result<(), Arc<TransportError>>> {
        let mut cx = Context::from_waker(noop_waker_ref());
        connection.poll_pump(&mut cx)
    }

    fn next_message(handle: &mut ConnectionHandle) -> Option<Result<Message, Arc<TransportError>>> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match handle.poll_next_unpin(&mut cx) {
            Poll::Ready(item) => item,
            Poll::Pending => panic!("no inbound message ready"),
        }
    }

    #[test]
    fn server_answers_pipelined_requests_in_order() {
        let (mut connection, mut handle, socket) = connection(Role::Server);
        socket.push_input("GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n");

        assert!(poll(&mut connection).is_pending());
        let first = next_message(&mut handle).unwrap().unwrap();
        let second = next_message(&mut handle).unwrap().unwrap();
        assert_eq!(first.as_request().unwrap().uri().path(), "/first");
        assert_eq!(second.as_request().unwrap().uri().path(), "/second");

        let first_receipt = handle.enqueue(Response::new(Entity::from_bytes("1")));
        let second_receipt = handle.enqueue(Response::new(Entity::from_bytes("2")));
        assert!(poll(&mut connection).is_pending());

        let output = String::from_utf8(socket.take_output()).unwrap();
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\n1HTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\n2"
        );
        assert!(futures::executor::block_on(first_receipt).is_sent());
        assert!(futures::executor::block_on(second_receipt).is_sent());
    }

    #[test]
    fn server_closes_after_answering_a_close_request() {
        let (mut connection, mut handle, socket) = connection(Role::Server);
        socket.push_input("GET / HTTP/1.1\r\nConnection: close\r\n\r\n");

        assert!(poll(&mut connection).is_pending());
        assert!(next_message(&mut handle).unwrap().is_ok());

        let _receipt = handle.enqueue(Response::new(()));
        assert!(matches!(poll(&mut connection), Poll::Ready(Ok(()))));

        let output = String::from_utf8(socket.output()).unwrap();
        assert!(output.contains("connection: close\r\n"));
        assert!(next_message(&mut handle).is_none());
    }

    #[test]
    fn server_answers_head_without_entity_bytes() {
        let (mut connection, mut handle, socket) = connection(Role::Server);
        socket.push_input("HEAD /page HTTP/1.1\r\n\r\nGET /page HTTP/1.1\r\n\r\n");

        assert!(poll(&mut connection).is_pending());
        assert_eq!(next_message(&mut handle).unwrap().unwrap().as_request().unwrap().method(), &Method::HEAD);
        assert_eq!(next_message(&mut handle).unwrap().unwrap().as_request().unwrap().method(), &Method::GET);

        let head_receipt = handle.enqueue(Response::new(Entity::from_bytes("page")));
        let get_receipt = handle.enqueue(Response::new(Entity::from_bytes("page")));
        assert!(poll(&mut connection).is_pending());

        let output = String::from_utf8(socket.take_output()).unwrap();
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\npage"
        );
        assert!(futures::executor::block_on(head_receipt).is_sent());
        assert!(futures::executor::block_on(get_receipt).is_sent());
    }

    #[test]
    fn client_reads_response_to_head_without_body() {
        let (mut connection, mut handle, socket) = connection(Role::Client);
        let request = Request::builder().method(Method::HEAD).uri("http://example.com/").body(()).unwrap();
        let _receipt = handle.enqueue(request);

        assert!(poll(&mut connection).is_pending());
        assert_eq!(socket.take_output(), b"HEAD / HTTP/1.1\r\nhost: example.com\r\n\r\n");

        socket.push_input("HTTP/1.1 200 OK\r\nContent-Length: 1024\r\n\r\n");
        assert!(poll(&mut connection).is_pending());

        let response = next_message(&mut handle).unwrap().unwrap();
        assert_eq!(response.as_response().unwrap().status(), StatusCode::OK);
        assert!(response.entity().is_none());
    }

    #[test]
    fn framing_error_fails_the_connection() {
        let (mut connection, mut handle, socket) = connection(Role::Server);
        socket.push_input("GET / HTTP/1.1\r\nBadHeaderNoColon\r\n\r\n");

        let Poll::Ready(Err(error)) = poll(&mut connection) else {
            panic!("connection should fail");
        };
        assert!(error.is_framing());

        assert!(matches!(next_message(&mut handle), Some(Err(_))));
        assert!(next_message(&mut handle).is_none());
    }

    #[test]
    fn peer_close_ends_the_connection() {
        let (mut connection, mut handle, socket) = connection(Role::Server);
        socket.close_input();

        assert!(matches!(poll(&mut connection), Poll::Ready(Ok(()))));
        assert!(next_message(&mut handle).is_none());
    }

    #[test]
    fn close_discards_queued_messages() {
        let (mut connection, handle, socket) = connection(Role::Server);
        socket.set_write_blocked(true);
        let receipt = handle.enqueue(Response::new(()));

        assert!(poll(&mut connection).is_pending());
        handle.close();
        assert!(matches!(poll(&mut connection), Poll::Ready(Ok(()))));

        assert!(matches!(futures::executor::block_on(receipt), Delivery::Discarded));
    }

    #[test]
    fn dropping_the_handle_closes_an_idle_server_connection() {
        let (mut connection, handle, _socket) = connection(Role::Server);
        drop(handle);
        assert!(matches!(poll(&mut connection), Poll::Ready(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let socket = MockSocket::new();
        let config = TransportConfig::builder().idle_timeout(Some(Duration::from_secs(5))).build().unwrap();
        let (connection, mut handle) =
            Connection::new(9, socket, Role::Server, &config, WorkerPool::new(1, 64), CancellationToken::new());

        let result = connection.await;
        assert!(matches!(result, Err(ref e) if matches!(**e, TransportError::Timeout)));
        assert!(matches!(handle.next().await, Some(Err(_))));
    }
}
