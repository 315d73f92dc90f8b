//! The sending direction of a connection.
//!
//! Each selection alternates two phases on the byte buffer until the socket
//! or the entity pushes back:
//!
//! - **fill**: a pending line in the line builder goes first, then either the
//!   framed entity writes straight into the spare room, or the next start line
//!   or header line is produced
//! - **drain**: the buffered bytes are written to the socket; a short write
//!   keeps the unwritten tail, a refused write leaves the buffer untouched
//!
//! The framing of a message is chosen once, when its start line is written,
//! and the header series is materialized once, when the header phase starts.

use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::task::{Context, Poll};

use bytes::Buf;
use futures::channel::oneshot;
use http::Method;
use tracing::{debug, trace};
use triomphe::Arc;

use crate::buffer::{BufferState, ByteBuffer, LineBuilder};
use crate::channel::{self, WorkerPool};
use crate::codec::{HeaderEncoder, HeaderSeries, PayloadEncoder};
use crate::connection::{Delivery, Socket};
use crate::protocol::{
    Entity, Message, MessageHead, PayloadItem, PayloadSize, SendError, TransportError, response_allows_body,
};
use crate::way::{IoState, MessageState, WayInterest};

/// A message waiting for, or going through, the outbound way.
#[derive(Debug)]
struct Outgoing {
    head: MessageHead,
    entity: Option<Entity>,
    receipt: Option<oneshot::Sender<Delivery>>,
}

impl Outgoing {
    fn settle(self, delivery: Delivery) {
        if let Some(receipt) = self.receipt {
            // the sender may have stopped waiting for the receipt
            let _ = receipt.send(delivery);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// no more room in the buffer
    Full,
    /// the entity will wake the task once it has more bytes
    Pending,
    /// every byte of the current message is in the buffer, or there is no message
    Done,
}

#[derive(Debug)]
pub struct OutboundWay {
    byte_buffer: ByteBuffer,
    line_builder: LineBuilder,
    queue: VecDeque<Outgoing>,
    current: Option<Outgoing>,
    message_state: MessageState,
    io_state: IoState,
    interest: WayInterest,
    header_index: usize,
    headers: Option<HeaderSeries>,
    payload_size: PayloadSize,
    encoder: PayloadEncoder,
    pool: WorkerPool,
    /// methods of the received requests not answered yet, server role only
    request_methods: VecDeque<Method>,
    /// the current message goes out with its entity
    sends_entity: bool,
    /// ordinal of the message the connection ends with
    final_message: Option<u64>,
    /// the current message is the final one
    closing: bool,
    completed: u64,
    written: u64,
}

impl OutboundWay {
    pub fn new(buffer_capacity: usize, pool: WorkerPool) -> Self {
        Self {
            byte_buffer: ByteBuffer::with_capacity(buffer_capacity),
            line_builder: LineBuilder::new(usize::MAX),
            queue: VecDeque::new(),
            current: None,
            message_state: MessageState::Idle,
            io_state: IoState::Idle,
            interest: WayInterest::None,
            header_index: 0,
            headers: None,
            payload_size: PayloadSize::Empty,
            encoder: PayloadEncoder::empty(),
            pool,
            request_methods: VecDeque::new(),
            sends_entity: true,
            final_message: None,
            closing: false,
            completed: 0,
            written: 0,
        }
    }

    /// Queues `message`, it becomes current once the messages before it are sent.
    pub fn enqueue(&mut self, message: Message, receipt: Option<oneshot::Sender<Delivery>>) {
        let (head, entity) = message.into_parts();
        self.queue.push_back(Outgoing { head, entity, receipt });
        if self.message_state == MessageState::Idle {
            self.next_message();
        }
    }

    /// Remembers the method of a received request, the response answering it is framed by it.
    pub fn record_request(&mut self, method: Method) {
        self.request_methods.push_back(method);
    }

    pub fn message_state(&self) -> MessageState {
        self.message_state
    }

    pub fn buffer_state(&self) -> BufferState {
        self.byte_buffer.state()
    }

    pub fn io_state(&self) -> IoState {
        self.io_state
    }

    pub fn interest(&self) -> WayInterest {
        self.interest
    }

    pub fn header_index(&self) -> usize {
        self.header_index
    }

    /// Number of messages sent completely.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Bytes handed to the socket so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Messages not sent yet, the current one included.
    pub fn queued(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Returns true once the connection is known to end after some message.
    pub fn close_after(&self) -> bool {
        self.final_message.is_some()
    }

    /// The ordinal, counting from 1, of the message the connection ends with.
    pub fn final_message(&self) -> Option<u64> {
        self.final_message
    }

    /// Makes message number `ordinal` (counting from 1) the last one of the connection.
    ///
    /// It goes out with `Connection: close`, earlier messages are unaffected.
    pub fn close_after_message(&mut self, ordinal: u64) {
        let ordinal = self.final_message.map_or(ordinal, |current| current.min(ordinal));
        if self.final_message != Some(ordinal) {
            debug!(ordinal, "connection ends after this outbound message");
            self.final_message = Some(ordinal);
        }
    }

    /// Returns true if nothing is queued and no byte is waiting for the socket.
    pub fn is_idle(&self) -> bool {
        self.message_state == MessageState::Idle
            && self.queue.is_empty()
            && self.line_builder.is_empty()
            && self.byte_buffer.is_filling()
            && self.byte_buffer.position() == 0
    }

    /// Returns true if no byte of the current message, if any, has been produced.
    pub fn is_between_messages(&self) -> bool {
        matches!(self.message_state, MessageState::Idle | MessageState::Start)
            && self.line_builder.is_empty()
            && self.byte_buffer.is_filling()
            && self.byte_buffer.position() == 0
    }

    /// Moves bytes until the socket or the entity can't take part any more.
    ///
    /// On return the way is either `Idle`, or in `Interest` with
    /// [`interest`](Self::interest) telling what it waits for.
    pub fn on_selected<S: Socket>(&mut self, socket: &S, cx: &mut Context<'_>) -> Result<(), SendError> {
        self.io_state = IoState::Processing;
        self.interest = WayInterest::None;

        loop {
            if self.byte_buffer.is_filling() {
                let fill = self.fill(cx)?;

                if self.byte_buffer.position() == 0 {
                    if fill == Fill::Pending {
                        trace!("outbound entity not ready");
                        self.set_interest(WayInterest::Entity);
                        return Ok(());
                    }

                    if self.message_state == MessageState::End {
                        self.on_completed();
                        continue;
                    }

                    debug_assert!(fill == Fill::Done, "empty buffer reported full");
                    self.io_state = IoState::Idle;
                    return Ok(());
                }

                self.byte_buffer.flip();
            }

            match socket.try_write(self.byte_buffer.readable()) {
                Ok(0) => {
                    trace!("socket accepted no bytes");
                    self.set_interest(WayInterest::Socket);
                    return Ok(());
                }
                Ok(n) => {
                    self.byte_buffer.advance(n);
                    self.written += n as u64;
                    trace!(len = n, pending = self.byte_buffer.pending(), "wrote outbound bytes");

                    if self.byte_buffer.has_remaining() {
                        self.byte_buffer.compact();
                    } else {
                        self.byte_buffer.clear();
                        if self.message_state == MessageState::End && self.line_builder.is_empty() {
                            self.on_completed();
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.set_interest(WayInterest::Socket);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(SendError::io(e)),
            }
        }
    }

    /// Settles every message after a connection failure.
    ///
    /// The current message gets the error, the queued ones are discarded.
    pub fn fail(&mut self, error: &Arc<TransportError>) {
        if let Some(current) = self.current.take() {
            current.settle(Delivery::Failed(Arc::clone(error)));
        }
        self.discard_queued();
        self.reset();
    }

    /// Settles every message as discarded, used when the connection closes without an error.
    pub fn discard(&mut self) {
        if let Some(current) = self.current.take() {
            current.settle(Delivery::Discarded);
        }
        self.discard_queued();
        self.reset();
    }

    fn discard_queued(&mut self) {
        let discarded = self.queue.len();
        for outgoing in self.queue.drain(..) {
            outgoing.settle(Delivery::Discarded);
        }
        if discarded > 0 {
            debug!(discarded, "discarded queued outbound messages");
        }
    }

    fn reset(&mut self) {
        self.byte_buffer.clear();
        self.line_builder.clear();
        self.headers = None;
        self.header_index = 0;
        self.encoder = PayloadEncoder::empty();
        self.message_state = MessageState::Idle;
        self.io_state = IoState::Idle;
        self.interest = WayInterest::None;
    }

    fn set_interest(&mut self, interest: WayInterest) {
        self.io_state = IoState::Interest;
        self.interest = interest;
    }

    fn fill(&mut self, cx: &mut Context<'_>) -> Result<Fill, SendError> {
        loop {
            if self.byte_buffer.spare() == 0 {
                return Ok(Fill::Full);
            }

            if !self.line_builder.is_empty() {
                self.line_builder.copy_to(&mut self.byte_buffer);
                continue;
            }

            match self.message_state {
                MessageState::Idle | MessageState::End => return Ok(Fill::Done),
                MessageState::Start | MessageState::Headers => self.write_line()?,
                MessageState::Body => match self.encoder.poll_transfer(cx, self.byte_buffer.spare_mut()) {
                    Poll::Ready(Ok(PayloadItem::Chunk(0))) => return Ok(Fill::Full),
                    Poll::Ready(Ok(PayloadItem::Chunk(n))) => self.byte_buffer.advance_mut(n),
                    Poll::Ready(Ok(PayloadItem::Eof)) => {
                        trace!("outbound entity finished");
                        self.message_state = MessageState::End;
                    }
                    Poll::Ready(Err(e)) => return Err(e),
                    Poll::Pending => return Ok(Fill::Pending),
                },
            }
        }
    }

    /// Produces the next start line or header line into the line builder.
    fn write_line(&mut self) -> Result<(), SendError> {
        let Some(current) = self.current.as_mut() else {
            self.message_state = MessageState::Idle;
            return Ok(());
        };

        match self.message_state {
            MessageState::Start => {
                HeaderEncoder::encode_start_line(&current.head, &mut self.line_builder)?;

                self.payload_size = HeaderEncoder::payload_size(&current.head, current.entity.as_ref());
                self.sends_entity = match &current.head {
                    MessageHead::Response(response) if !response.status().is_informational() => {
                        let request_method = self.request_methods.pop_front();
                        response_allows_body(response.status(), request_method.as_ref())
                    }
                    MessageHead::Response(_) => false,
                    MessageHead::Request(_) => true,
                };

                let ordinal = self.completed + 1;
                self.closing = self.final_message.is_some_and(|last| ordinal >= last)
                    || HeaderEncoder::closes_connection(&current.head, self.payload_size);
                if self.closing {
                    self.close_after_message(ordinal);
                }
                self.header_index = 0;
                self.message_state = MessageState::Headers;
            }

            MessageState::Headers => {
                let series = self.headers.get_or_insert_with(|| {
                    let content_type = current.entity.as_ref().and_then(Entity::content_type);
                    HeaderEncoder::header_series(&current.head, self.payload_size, content_type, !self.closing)
                });

                if let Some((name, value)) = series.get(self.header_index) {
                    HeaderEncoder::encode_header(name, value, &mut self.line_builder)?;
                    self.header_index += 1;
                    return Ok(());
                }

                self.line_builder.write_all(b"\r\n")?;

                match current.entity.take() {
                    Some(entity) if self.sends_entity && !self.payload_size.is_empty() => {
                        let channel = channel::open(entity.into_source(), &self.pool);
                        debug!(
                            channel_type = ?channel.channel_type(),
                            payload_size = ?self.payload_size,
                            "outbound headers written, sending entity"
                        );
                        self.encoder = PayloadEncoder::new(self.payload_size, channel);
                        self.message_state = MessageState::Body;
                    }
                    Some(_) if !self.sends_entity => {
                        debug!(payload_size = ?self.payload_size, "outbound headers written, entity not sent in reply");
                        self.message_state = MessageState::End;
                    }
                    _ => {
                        debug!(headers = self.header_index, "outbound headers written, no entity");
                        self.message_state = MessageState::End;
                    }
                }
            }

            MessageState::Idle | MessageState::Body | MessageState::End => {}
        }

        Ok(())
    }

    fn on_completed(&mut self) {
        self.header_index = 0;
        self.headers = None;
        self.encoder = PayloadEncoder::empty();
        self.completed += 1;

        if let Some(done) = self.current.take() {
            done.settle(Delivery::Sent);
        }
        debug!(completed = self.completed, "outbound message completed");

        self.next_message();
    }

    fn next_message(&mut self) {
        match self.queue.pop_front() {
            Some(next) => {
                self.current = Some(next);
                self.message_state = MessageState::Start;
            }
            None => self.message_state = MessageState::Idle,
        }
    }
}
