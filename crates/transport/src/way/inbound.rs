//! The receiving direction of a connection.
//!
//! Bytes read from the socket are parsed in place: lines are collected by the
//! line builder across as many reads as they need, bodies go through the
//! [`PayloadDecoder`] chosen from the headers, and every finished message is
//! queued until the connection hands it to the application. The buffer is
//! always parsed to the end before the next read, so nothing is kept in it
//! between selections.

use std::collections::VecDeque;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use http::{Method, header};
use mime::Mime;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferState, ByteBuffer, LineBuilder};
use crate::codec::header::{is_keep_alive, parse_payload};
use crate::codec::{HeaderDecoder, PayloadDecoder};
use crate::config::TransportConfig;
use crate::connection::{Role, Socket};
use crate::ensure;
use crate::protocol::{Entity, Message, MessageHead, ParseError, PayloadItem, PayloadSize};
use crate::way::{IoState, MessageState};

/// Reads per selection before the way gives the other connections a turn.
const READ_ROUNDS: usize = 16;

#[derive(Debug)]
pub struct InboundWay {
    byte_buffer: ByteBuffer,
    line_builder: LineBuilder,
    role: Role,
    message_state: MessageState,
    io_state: IoState,
    header_decoder: HeaderDecoder,
    /// start line and header lines of the current message, CRLF terminated
    head_bytes: BytesMut,
    head: Option<MessageHead>,
    payload_size: PayloadSize,
    decoder: PayloadDecoder,
    body: BytesMut,
    max_entity_size: u64,
    messages: VecDeque<Message>,
    /// methods of the requests sent and not answered yet, client role only
    expected_methods: VecDeque<Method>,
    keep_alive: bool,
    /// ordinal of the message the connection ends with
    final_message: Option<u64>,
    eof: bool,
    completed: u64,
    read: u64,
}

impl InboundWay {
    pub fn new(config: &TransportConfig, role: Role) -> Self {
        Self {
            byte_buffer: ByteBuffer::with_capacity(config.buffer_capacity()),
            line_builder: LineBuilder::new(config.max_header_bytes()),
            role,
            message_state: MessageState::Idle,
            io_state: IoState::Idle,
            header_decoder: HeaderDecoder::new(config.max_header_bytes(), config.max_header_num()),
            head_bytes: BytesMut::new(),
            head: None,
            payload_size: PayloadSize::Empty,
            decoder: PayloadDecoder::empty(),
            body: BytesMut::new(),
            max_entity_size: config.max_entity_size(),
            messages: VecDeque::new(),
            expected_methods: VecDeque::new(),
            keep_alive: true,
            final_message: None,
            eof: false,
            completed: 0,
            read: 0,
        }
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

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    /// Number of messages parsed completely, interim responses not included.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Bytes taken from the socket so far.
    pub fn read(&self) -> u64 {
        self.read
    }

    /// Returns false once a message said the connection ends after it.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The ordinal, counting from 1, of the message the connection ends with.
    pub fn final_message(&self) -> Option<u64> {
        self.final_message
    }

    /// Returns true once the peer closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Returns true if no more messages can arrive.
    pub fn is_finished(&self) -> bool {
        self.eof || (!self.keep_alive && self.is_between_messages())
    }

    /// Returns true if no byte of a next message has been parsed yet.
    pub fn is_between_messages(&self) -> bool {
        match self.message_state {
            MessageState::Idle => true,
            MessageState::Start => self.line_builder.is_empty(),
            MessageState::Headers | MessageState::Body | MessageState::End => false,
        }
    }

    /// Remembers the method of a request that went out, its response is framed by it.
    pub fn expect_response(&mut self, method: Method) {
        debug_assert!(self.role == Role::Client, "only clients wait for responses");
        self.expected_methods.push_back(method);
    }

    /// Number of sent requests still waiting for their response.
    pub fn awaiting_responses(&self) -> usize {
        self.expected_methods.len()
    }

    pub fn pop_message(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Reads and parses what the socket has.
    ///
    /// On return the way is `Interest` when the socket ran dry, `Idle` when no
    /// more messages can arrive, and still `Processing` when it stopped after
    /// its read rounds with more bytes possibly waiting.
    pub fn on_selected<S: Socket>(&mut self, socket: &S) -> Result<(), ParseError> {
        self.io_state = IoState::Processing;

        for _ in 0..READ_ROUNDS {
            if self.is_finished() {
                self.io_state = IoState::Idle;
                return Ok(());
            }

            match socket.try_read(self.byte_buffer.spare_mut()) {
                Ok(0) => {
                    trace!("peer closed its side");
                    self.on_eof()?;
                    self.io_state = IoState::Idle;
                    return Ok(());
                }
                Ok(n) => {
                    trace!(len = n, "read inbound bytes");
                    self.read += n as u64;
                    self.byte_buffer.advance_mut(n);
                    self.byte_buffer.flip();
                    let parsed = self.parse();
                    self.byte_buffer.clear();
                    parsed?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.io_state = IoState::Interest;
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(ParseError::io(e)),
            }
        }

        Ok(())
    }

    fn parse(&mut self) -> Result<(), ParseError> {
        loop {
            match self.message_state {
                MessageState::Idle | MessageState::Start => {
                    if !self.byte_buffer.has_remaining() {
                        return Ok(());
                    }
                    if !self.keep_alive {
                        let discarded = self.byte_buffer.remaining();
                        warn!(len = discarded, "discarding bytes after the final message");
                        self.byte_buffer.advance(discarded);
                        return Ok(());
                    }

                    self.message_state = MessageState::Start;
                    if !self.line_builder.read_line(&mut self.byte_buffer)? {
                        return Ok(());
                    }

                    let raw_len = self.line_builder.len();
                    let line = self.line_builder.take_line();
                    if line.is_empty() {
                        trace!("skipping empty line before start line");
                        continue;
                    }

                    self.header_decoder.account(raw_len)?;
                    self.head_bytes.extend_from_slice(&line);
                    self.head_bytes.extend_from_slice(b"\r\n");
                    self.message_state = MessageState::Headers;
                }

                MessageState::Headers => {
                    if !self.line_builder.read_line(&mut self.byte_buffer)? {
                        return Ok(());
                    }

                    let raw_len = self.line_builder.len();
                    let line = self.line_builder.take_line();
                    self.header_decoder.account(raw_len)?;
                    self.head_bytes.extend_from_slice(&line);
                    self.head_bytes.extend_from_slice(b"\r\n");

                    if line.is_empty() {
                        let src = self.head_bytes.split().freeze();
                        let head = match self.role {
                            Role::Server => self.header_decoder.decode_request(src)?,
                            Role::Client => self.header_decoder.decode_response(src)?,
                        };
                        self.head = Some(head);
                        self.on_headers_complete()?;
                    }
                }

                MessageState::Body => match self.decoder.decode(&mut self.byte_buffer, &mut self.body)? {
                    Some(PayloadItem::Chunk(n)) => {
                        trace!(len = n, total = self.body.len(), "read inbound entity bytes");
                        ensure!(
                            self.body.len() as u64 <= self.max_entity_size,
                            ParseError::too_large_entity(self.max_entity_size)
                        );
                    }
                    Some(PayloadItem::Eof) => self.message_state = MessageState::End,
                    None => return Ok(()),
                },

                MessageState::End => self.on_completed(),
            }
        }
    }

    fn on_headers_complete(&mut self) -> Result<(), ParseError> {
        let Some(head) = self.head.as_ref() else {
            return Err(ParseError::invalid_start_line("headers without a start line"));
        };

        let request_method = match self.role {
            Role::Client => self.expected_methods.front(),
            Role::Server => None,
        };
        let payload_size = parse_payload(head, request_method)?;

        if let PayloadSize::Length(length) = payload_size {
            ensure!(length <= self.max_entity_size, ParseError::too_large_entity(self.max_entity_size));
        }

        if self.keep_alive && (!is_keep_alive(head) || payload_size.is_until_close()) {
            debug!("connection ends after this inbound message");
            self.keep_alive = false;
            self.final_message = Some(self.completed + 1);
        }

        debug!(payload_size = ?payload_size, "inbound headers parsed");
        self.payload_size = payload_size;
        self.decoder = PayloadDecoder::new(payload_size);
        self.message_state = MessageState::Body;
        Ok(())
    }

    fn on_completed(&mut self) {
        self.header_decoder.reset();
        self.decoder = PayloadDecoder::empty();
        self.payload_size = PayloadSize::Empty;
        self.message_state = MessageState::Idle;

        let Some(head) = self.head.take() else {
            return;
        };

        let interim = matches!(&head, MessageHead::Response(response) if response.status().is_informational());
        if !interim {
            self.completed += 1;
            if self.role == Role::Client {
                self.expected_methods.pop_front();
            }
        }

        let body = self.body.split().freeze();
        let entity = (!body.is_empty()).then(|| {
            let content_type = head
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<Mime>().ok());
            let mut entity = Entity::from_bytes(body);
            entity.set_content_type(content_type);
            entity
        });

        debug!(completed = self.completed, interim, "inbound message completed");
        self.messages.push_back(Message::new(head, entity));
    }

    fn on_eof(&mut self) -> Result<(), ParseError> {
        self.eof = true;

        match self.message_state {
            MessageState::Idle | MessageState::Start if self.line_builder.is_empty() => {
                debug!("peer closed between messages");
                Ok(())
            }
            MessageState::Idle | MessageState::Start => Err(ParseError::unexpected_eof("start line")),
            MessageState::Headers => Err(ParseError::unexpected_eof("headers")),
            MessageState::Body => {
                self.decoder.finish()?;
                self.on_completed();
                Ok(())
            }
            MessageState::End => {
                self.on_completed();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockSocket;
    use crate::protocol::TransportError;
    use bytes::Bytes;
    use http::{StatusCode, Version};
    use indoc::indoc;

    fn config() -> TransportConfig {
        TransportConfig::builder().buffer_capacity(64).build().unwrap()
    }

    fn drive(way: &mut InboundWay, socket: &MockSocket) -> Result<(), ParseError> {
        for _ in 0..1000 {
            way.on_selected(socket)?;
            if way.io_state() != IoState::Processing {
                return Ok(());
            }
        }
        panic!("inbound way never settled");
    }

    fn entity_bytes(message: &Message) -> Bytes {
        message.entity().and_then(Entity::as_bytes).cloned().unwrap_or_default()
    }

    #[test]
    fn sized_request_over_tiny_segments() {
        let socket = MockSocket::new();
        let wire = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\nhello world";
        for byte in wire {
            socket.push_input([*byte]);
        }

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        let message = way.pop_message().unwrap();
        let request = message.as_request().unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.uri().path(), "/submit");
        assert_eq!(message.headers().get(header::HOST).unwrap(), "example.com");
        assert_eq!(entity_bytes(&message), Bytes::from_static(b"hello world"));
        assert_eq!(message.entity().unwrap().content_type(), Some(&mime::TEXT_PLAIN));
        assert_eq!(way.io_state(), IoState::Interest);
        assert_eq!(way.message_state(), MessageState::Idle);
        assert_eq!(way.buffer_state(), BufferState::Filling);
    }

    #[test]
    fn chunked_request_across_segments() {
        let socket = MockSocket::new();
        socket.push_input("PUT /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel");
        socket.push_input("lo\r\n6;ext=1\r\n worl");
        socket.push_input("d\r\n0\r\nTrailer: x\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        let message = way.pop_message().unwrap();
        assert_eq!(entity_bytes(&message), Bytes::from_static(b"hello world"));
        assert!(way.pop_message().is_none());
        assert_eq!(way.completed(), 1);
    }

    #[test]
    fn pipelined_requests_in_one_read() {
        let socket = MockSocket::new();
        socket.push_input("GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\nPOST /c HTTP/1.1\r\nContent-Length: 2\r\n\r\nok");

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        let paths: Vec<_> = std::iter::from_fn(|| way.pop_message())
            .map(|message| message.as_request().unwrap().uri().path().to_owned())
            .collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
        assert_eq!(way.completed(), 3);
    }

    #[test]
    fn bare_line_feeds_are_accepted() {
        let socket = MockSocket::new();
        socket.push_input(indoc! {"
            GET /index.html HTTP/1.0
            User-Agent: curl/7.79.1
            Connection: keep-alive

        "});

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        let message = way.pop_message().unwrap();
        assert_eq!(message.head().version(), Version::HTTP_10);
        assert!(message.entity().is_none());
        assert!(way.keep_alive());
    }

    #[test]
    fn leading_empty_lines_are_skipped() {
        let socket = MockSocket::new();
        socket.push_input("\r\n\r\nGET / HTTP/1.1\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();
        assert!(way.pop_message().is_some());
    }

    #[test]
    fn header_without_colon_is_a_framing_error() {
        let socket = MockSocket::new();
        socket.push_input("GET / HTTP/1.1\r\nBadHeaderNoColon\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        let err = drive(&mut way, &socket).unwrap_err();

        assert!(matches!(err, ParseError::InvalidHeader { .. }));
        assert!(TransportError::from(err).is_framing());
        assert!(way.pop_message().is_none());
    }

    #[test]
    fn both_framing_headers_are_rejected() {
        let socket = MockSocket::new();
        socket.push_input("POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn chunk_size_line_without_a_size_is_rejected() {
        let socket = MockSocket::new();
        socket.push_input("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        let err = drive(&mut way, &socket).unwrap_err();

        assert!(matches!(err, ParseError::InvalidChunk { .. }));
        assert!(TransportError::from(err).is_framing());
        assert!(way.pop_message().is_none());
        assert_eq!(way.completed(), 0);
    }

    #[test]
    fn oversized_entity_is_rejected() {
        let socket = MockSocket::new();
        socket.push_input("POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n");
        let config = TransportConfig::builder().max_entity_size(10).build().unwrap();

        let mut way = InboundWay::new(&config, Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::TooLargeEntity { max_size: 10 })));

        let socket = MockSocket::new();
        socket.push_input("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nC\r\ntwelve bytes\r\n0\r\n\r\n");
        let mut way = InboundWay::new(&config, Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::TooLargeEntity { .. })));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let socket = MockSocket::new();
        socket.push_input(format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "a".repeat(200)));
        let config = TransportConfig::builder().max_header_bytes(128).build().unwrap();

        let mut way = InboundWay::new(&config, Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn connection_close_ends_the_stream() {
        let socket = MockSocket::new();
        socket.push_input("GET /last HTTP/1.1\r\nConnection: close\r\n\r\nGET /ignored HTTP/1.1\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        assert_eq!(way.pop_message().unwrap().as_request().unwrap().uri().path(), "/last");
        assert!(way.pop_message().is_none());
        assert!(!way.keep_alive());
        assert_eq!(way.final_message(), Some(1));
        assert!(way.is_finished());
        assert_eq!(way.io_state(), IoState::Idle);
    }

    #[test]
    fn response_to_head_has_no_body() {
        let socket = MockSocket::new();
        socket.push_input("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

        let mut way = InboundWay::new(&config(), Role::Client);
        way.expect_response(Method::HEAD);
        way.expect_response(Method::GET);
        drive(&mut way, &socket).unwrap();

        assert!(way.pop_message().unwrap().entity().is_none());
        assert_eq!(entity_bytes(&way.pop_message().unwrap()), Bytes::from_static(b"hello"));
        assert_eq!(way.awaiting_responses(), 0);
    }

    #[test]
    fn interim_responses_do_not_answer_requests() {
        let socket = MockSocket::new();
        socket.push_input("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n");

        let mut way = InboundWay::new(&config(), Role::Client);
        way.expect_response(Method::POST);
        drive(&mut way, &socket).unwrap();

        assert_eq!(way.pop_message().unwrap().as_response().unwrap().status(), StatusCode::CONTINUE);
        assert_eq!(way.pop_message().unwrap().as_response().unwrap().status(), StatusCode::CREATED);
        assert_eq!(way.completed(), 1);
        assert_eq!(way.awaiting_responses(), 0);
    }

    #[test]
    fn close_delimited_response_completes_at_eof() {
        let socket = MockSocket::new();
        socket.push_input("HTTP/1.0 200 OK\r\n\r\nraw bytes ");
        socket.push_input("until the end");
        socket.close_input();

        let mut way = InboundWay::new(&config(), Role::Client);
        way.expect_response(Method::GET);
        drive(&mut way, &socket).unwrap();

        let message = way.pop_message().unwrap();
        assert_eq!(entity_bytes(&message), Bytes::from_static(b"raw bytes until the end"));
        assert!(way.is_eof());
        assert!(!way.keep_alive());
    }

    #[test]
    fn eof_inside_a_body_is_an_error() {
        let socket = MockSocket::new();
        socket.push_input("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort");
        socket.close_input();

        let mut way = InboundWay::new(&config(), Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::UnexpectedEof { position: "entity" })));
    }

    #[test]
    fn eof_inside_headers_is_an_error() {
        let socket = MockSocket::new();
        socket.push_input("GET / HTTP/1.1\r\nHost: exa");
        socket.close_input();

        let mut way = InboundWay::new(&config(), Role::Server);
        assert!(matches!(drive(&mut way, &socket), Err(ParseError::UnexpectedEof { position: "headers" })));
    }

    #[test]
    fn eof_between_messages_is_clean() {
        let socket = MockSocket::new();
        socket.push_input("GET / HTTP/1.1\r\n\r\n");
        socket.close_input();

        let mut way = InboundWay::new(&config(), Role::Server);
        drive(&mut way, &socket).unwrap();

        assert!(way.pop_message().is_some());
        assert!(way.is_eof());
        assert!(way.is_finished());
    }
}
